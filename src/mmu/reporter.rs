// src/mmu/reporter.rs - single-slot coalescing report sink (spec.md §4.4).
//
// Grounded on `original_source/.../mmu2_reporting.h`'s `Reporter`. Holds at
// most one pending report; `set_report` overwrites whatever was pending,
// which is the intended "only the latest matters" coalescing behaviour.
use super::catalogue::ErrCode;
use super::error_codes::{CommandInProgress, ProgressCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    None,
    Mmu,
    Printer,
}

#[derive(Debug, Clone, Copy)]
pub enum Report {
    Progress {
        cmd: CommandInProgress,
        code: ProgressCode,
        step_progress: u8,
    },
    Error {
        cmd: CommandInProgress,
        code: ErrCode,
        source: ErrorSource,
    },
}

impl Report {
    /// Equality used for deduplication (spec.md §4.4): same
    /// `CommandInProgress`, and either matching (ErrorCode, ErrorSource) for
    /// two error reports or matching ProgressCode for two progress reports.
    /// An error with `NoCommand` and a matching source is treated as equal
    /// regardless of other fields (async MMU errors arrive detached from
    /// any in-progress command).
    pub fn report_eq(&self, other: &Report) -> bool {
        match (self, other) {
            (
                Report::Error {
                    cmd: c1,
                    code: e1,
                    source: s1,
                },
                Report::Error {
                    cmd: c2,
                    code: e2,
                    source: s2,
                },
            ) => {
                if *c1 == CommandInProgress::NoCommand
                    && *c2 == CommandInProgress::NoCommand
                    && s1 == s2
                {
                    return true;
                }
                c1 == c2 && e1 == e2 && s1 == s2
            }
            (
                Report::Progress {
                    cmd: c1, code: p1, ..
                },
                Report::Progress {
                    cmd: c2, code: p2, ..
                },
            ) => c1 == c2 && p1 == p2,
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Reporter {
    pending: Option<Report>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites any unconsumed prior report.
    pub fn set_report(&mut self, report: Report) {
        self.pending = Some(report);
    }

    /// Returns the pending report without consuming it.
    pub fn peek_report(&self) -> Option<&Report> {
        self.pending.as_ref()
    }

    /// Returns and clears the pending report.
    pub fn consume_report(&mut self) -> Option<Report> {
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_report_overwrites_unconsumed_prior_report() {
        let mut reporter = Reporter::new();
        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::EngagingIdler,
            step_progress: 0,
        });
        reporter.set_report(Report::Progress {
            cmd: CommandInProgress::ToolChange,
            code: ProgressCode::UnloadingToFinda,
            step_progress: 0,
        });
        let consumed = reporter.consume_report().unwrap();
        match consumed {
            Report::Progress { code, .. } => assert_eq!(code, ProgressCode::UnloadingToFinda),
            _ => panic!("expected progress report"),
        }
        assert!(reporter.consume_report().is_none());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut reporter = Reporter::new();
        reporter.set_report(Report::Error {
            cmd: CommandInProgress::NoCommand,
            code: ErrCode::ConnectMmuNotResponding,
            source: ErrorSource::Mmu,
        });
        assert!(reporter.peek_report().is_some());
        assert!(reporter.has_pending());
        assert!(reporter.consume_report().is_some());
        assert!(!reporter.has_pending());
    }

    #[test]
    fn nocommand_errors_with_matching_source_are_equal_regardless_of_code() {
        let a = Report::Error {
            cmd: CommandInProgress::NoCommand,
            code: ErrCode::ConnectMmuNotResponding,
            source: ErrorSource::Mmu,
        };
        let b = Report::Error {
            cmd: CommandInProgress::NoCommand,
            code: ErrCode::SystemQueueFull,
            source: ErrorSource::Mmu,
        };
        assert!(a.report_eq(&b));
    }
}
