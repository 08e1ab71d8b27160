fn main() {
    concord::run()
}
