//! Turns a complete set of terminal task states into a [`Report`].

use crate::{Error, OverallStatus, Report, Result, StatusCounts, TaskState};

#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    /// Builds the report for a finished batch.
    ///
    /// Fails with [`Error::IncompleteBatch`] if any state is not terminal.
    /// The output preserves input order and depends on nothing but the input.
    pub fn aggregate(states: &[TaskState]) -> Result<Report> {
        ensure_terminal(states)?;

        let counts = StatusCounts::from_states(states);
        let overall_status = if counts.succeeded == states.len() {
            OverallStatus::Success
        } else if counts.succeeded == 0 {
            OverallStatus::Failure
        } else {
            OverallStatus::PartialFailure
        };

        Ok(Report {
            total: states.len(),
            counts,
            overall_status,
            truncated: false,
            tasks: states.to_vec(),
        })
    }

    /// Report for a batch cut short by a deadline. The overall status is
    /// always [`OverallStatus::PartialFailure`].
    pub fn aggregate_truncated(states: &[TaskState]) -> Result<Report> {
        let mut report = Self::aggregate(states)?;
        report.overall_status = OverallStatus::PartialFailure;
        report.truncated = true;
        Ok(report)
    }
}

fn ensure_terminal(states: &[TaskState]) -> Result<()> {
    match states.iter().find(|state| !state.is_terminal()) {
        Some(state) => Err(Error::IncompleteBatch {
            task_id: state.id.clone(),
            status: state.status,
        }),
        None => Ok(()),
    }
}
