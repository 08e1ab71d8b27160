use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

/// SQL list of the states `ReportState::is_in_progress` accepts.
fn in_progress_states() -> String {
    let labels: Vec<String> = ReportState::ALL
        .iter()
        .filter(|s| s.is_in_progress())
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    format!("({})", labels.join(", "))
}

fn now() -> String {
    format_datetime(&chrono::Local::now().naive_local())
}

/// Reset the report columns to `PENDING(0)` for a new job.
///
/// With `reject_in_flight`, the in-progress check and the write are one
/// conditional UPDATE, so two racing triggers cannot both start. Returns
/// `false` when the row was left untouched (missing or in flight).
pub fn begin_report_job(
    conn: &Connection,
    discussion_id: &Uuid,
    job_id: &Uuid,
    reject_in_flight: bool,
) -> Result<bool, DatabaseError> {
    let in_progress = in_progress_states();
    let sql = format!(
        "UPDATE discussions
         SET report = NULL, report_progress = 0.0, report_state = 'PENDING',
             report_error = NULL, report_job_id = ?2, report_category = NULL,
             report_updated_at = ?3
         WHERE id = ?1
           AND (?4 = 0 OR report_state IS NULL OR report_state NOT IN {in_progress})"
    );
    let affected = conn.execute(
        &sql,
        params![
            discussion_id.to_string(),
            job_id.to_string(),
            now(),
            reject_in_flight as i32,
        ],
    )?;
    Ok(affected == 1)
}

/// Advance a running job to `state`.
///
/// Matches only while `job_id` still owns the row, the row is still in
/// progress and the stored progress does not exceed the new one. `false`
/// means the job was superseded, cancelled or already finished.
pub fn write_report_checkpoint(
    conn: &Connection,
    discussion_id: &Uuid,
    job_id: &Uuid,
    state: ReportState,
    category: Option<Category>,
    report: Option<&serde_json::Value>,
) -> Result<bool, DatabaseError> {
    let Some(progress) = state.progress() else {
        return Err(DatabaseError::ConstraintViolation(
            "checkpoint state must carry progress".into(),
        ));
    };
    let report_json = report.map(|r| r.to_string());

    let in_progress = in_progress_states();
    let sql = format!(
        "UPDATE discussions
         SET report_state = ?3, report_progress = ?4,
             report_category = COALESCE(?5, report_category),
             report = COALESCE(?6, report),
             report_updated_at = ?7
         WHERE id = ?1 AND report_job_id = ?2
           AND report_state IN {in_progress}
           AND report_progress <= ?4"
    );
    let affected = conn.execute(
        &sql,
        params![
            discussion_id.to_string(),
            job_id.to_string(),
            state.as_str(),
            progress,
            category.map(|c| c.as_str()),
            report_json,
            now(),
        ],
    )?;
    Ok(affected == 1)
}

/// Terminal failure: `FAILED`, progress cleared, error detail kept.
pub fn fail_report_job(
    conn: &Connection,
    discussion_id: &Uuid,
    job_id: &Uuid,
    error: &str,
) -> Result<bool, DatabaseError> {
    let in_progress = in_progress_states();
    let sql = format!(
        "UPDATE discussions
         SET report_state = 'FAILED', report_progress = NULL, report = NULL,
             report_error = ?3, report_updated_at = ?4
         WHERE id = ?1 AND report_job_id = ?2
           AND report_state IN {in_progress}"
    );
    let affected = conn.execute(
        &sql,
        params![discussion_id.to_string(), job_id.to_string(), error, now()],
    )?;
    Ok(affected == 1)
}

/// Mark every in-progress report as failed. Used once at startup, when no
/// job thread can still be alive.
pub fn fail_interrupted_reports(conn: &Connection, error: &str) -> Result<usize, DatabaseError> {
    let in_progress = in_progress_states();
    let sql = format!(
        "UPDATE discussions
         SET report_state = 'FAILED', report_progress = NULL, report = NULL,
             report_error = ?1, report_updated_at = ?2
         WHERE report_state IN {in_progress}"
    );
    Ok(conn.execute(&sql, params![error, now()])?)
}

pub fn get_report_status(
    conn: &Connection,
    discussion_id: &Uuid,
) -> Result<Option<ReportStatus>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT report_state, report_progress, report, report_error,
                    report_job_id, report_category, report_updated_at
             FROM discussions WHERE id = ?1",
            params![discussion_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((state, report_progress, report, error, job_id, category, updated_at)) = row else {
        return Ok(None);
    };

    let report = report
        .map(|json| {
            serde_json::from_str(&json)
                .map_err(|e| DatabaseError::ConstraintViolation(format!("report json: {e}")))
        })
        .transpose()?;

    Ok(Some(ReportStatus {
        state: state.as_deref().map(ReportState::from_str).transpose()?,
        report_progress,
        report,
        error,
        job_id: job_id.as_deref().map(parse_uuid).transpose()?,
        category: category.as_deref().map(Category::from_str).transpose()?,
        updated_at: updated_at.as_deref().map(parse_datetime),
    }))
}
