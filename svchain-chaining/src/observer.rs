use std::fmt::{self, Display};

use log::{debug, error, info, warn};

use crate::consts::CHAIN_DIAG_PREFIX;
use crate::proposed::LinkSkipType;

/// Engine state machine positions reported through [`ChainingEvent::StateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFinderState {
    Uninitialised,
    Seeded,
    Searching,
    Converged,
    Failed,
}

impl Display for ChainFinderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainFinderState::Uninitialised => "uninitialised",
            ChainFinderState::Seeded => "seeded",
            ChainFinderState::Searching => "searching",
            ChainFinderState::Converged => "converged",
            ChainFinderState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Something of note that happened while chaining one cluster.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainingEvent {
    LinkAdded {
        cluster_id: u32,
        chain_id: usize,
        link: String,
        jcn: f64,
        reason: String,
        link_index: usize,
    },
    LinkSkipped {
        cluster_id: u32,
        link: String,
        skip_type: LinkSkipType,
    },
    ChainSplit {
        cluster_id: u32,
        chain_id: usize,
        new_chain_id: usize,
        jcn: f64,
    },
    ChainsMerged {
        cluster_id: u32,
        chain_id: usize,
        merged_chain_id: usize,
    },
    ChainClosed {
        cluster_id: u32,
        chain_id: usize,
    },
    Stagnated {
        cluster_id: u32,
        iterations: usize,
    },
    Invalid {
        cluster_id: u32,
        reason: String,
    },
    StateChanged {
        cluster_id: u32,
        state: ChainFinderState,
    },
    /// A `CHAIN_DIAG` record.
    Diagnostic {
        kind: String,
        sample_id: String,
        cluster_id: u32,
        sv_id: u32,
        info: String,
    },
}

impl ChainingEvent {
    pub fn diagnostic(kind: &str, sample_id: &str, cluster_id: u32, sv_id: u32, info: String) -> Self {
        ChainingEvent::Diagnostic {
            kind: kind.to_string(),
            sample_id: sample_id.to_string(),
            cluster_id,
            sv_id,
            info,
        }
    }

    /// `CHAIN_DIAG: <type>,<sampleId>,<clusterId>,<svId>,<otherInfo>` for
    /// diagnostic events.
    pub fn diag_line(&self) -> Option<String> {
        match self {
            ChainingEvent::Diagnostic {
                kind,
                sample_id,
                cluster_id,
                sv_id,
                info,
            } => Some(format!(
                "{}: {},{},{},{},{}",
                CHAIN_DIAG_PREFIX, kind, sample_id, cluster_id, sv_id, info
            )),
            _ => None,
        }
    }
}

/// Receives engine events as they happen.
pub trait ChainingObserver {
    fn on_event(&mut self, event: &ChainingEvent);
}

impl<T: ChainingObserver + ?Sized> ChainingObserver for &mut T {
    fn on_event(&mut self, event: &ChainingEvent) {
        (**self).on_event(event)
    }
}

/// Forwards events to the `log` facade. Per-link detail is only emitted when
/// verbose.
#[derive(Debug, Clone, Default)]
pub struct LogObserver {
    verbose: bool,
}

impl LogObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ChainingObserver for LogObserver {
    fn on_event(&mut self, event: &ChainingEvent) {
        match event {
            ChainingEvent::LinkAdded {
                cluster_id,
                chain_id,
                link,
                jcn,
                reason,
                link_index,
            } => {
                if self.verbose {
                    info!(
                        "cluster({}) index({}) chain({}) added {} jcn={:.1} reason={}",
                        cluster_id, link_index, chain_id, link, jcn, reason
                    );
                } else {
                    debug!(
                        "cluster({}) chain({}) added {} reason={}",
                        cluster_id, chain_id, link, reason
                    );
                }
            }
            ChainingEvent::LinkSkipped {
                cluster_id,
                link,
                skip_type,
            } => debug!("cluster({}) skipped {} ({})", cluster_id, link, skip_type),
            ChainingEvent::ChainSplit {
                cluster_id,
                chain_id,
                new_chain_id,
                jcn,
            } => debug!(
                "cluster({}) chain({}) split off chain({}) jcn={:.1}",
                cluster_id, chain_id, new_chain_id, jcn
            ),
            ChainingEvent::ChainsMerged {
                cluster_id,
                chain_id,
                merged_chain_id,
            } => debug!(
                "cluster({}) chain({}) merged chain({})",
                cluster_id, chain_id, merged_chain_id
            ),
            ChainingEvent::ChainClosed {
                cluster_id,
                chain_id,
            } => debug!("cluster({}) chain({}) closed", cluster_id, chain_id),
            ChainingEvent::Stagnated {
                cluster_id,
                iterations,
            } => warn!(
                "cluster({}) no progress after {} iterations, stopping",
                cluster_id, iterations
            ),
            ChainingEvent::Invalid { cluster_id, reason } => {
                error!("cluster({}) chaining invalid: {}", cluster_id, reason)
            }
            ChainingEvent::StateChanged { cluster_id, state } => {
                if self.verbose {
                    info!("cluster({}) {}", cluster_id, state);
                }
            }
            ChainingEvent::Diagnostic { .. } => {
                if let Some(line) = event.diag_line() {
                    debug!("{}", line);
                }
            }
        }
    }
}

/// Keeps every event, for inspection in tests and reports.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub events: Vec<ChainingEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links_added(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, ChainingEvent::LinkAdded { .. }))
            .count()
    }

    pub fn diag_lines(&self) -> Vec<String> {
        self.events.iter().filter_map(|e| e.diag_line()).collect()
    }

    pub fn states(&self) -> Vec<ChainFinderState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ChainingEvent::StateChanged { state, .. } => Some(*state),
                _ => None,
            })
            .collect()
    }
}

impl ChainingObserver for RecordingObserver {
    fn on_event(&mut self, event: &ChainingEvent) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_diag_line_format() {
        let event = ChainingEvent::diagnostic("ASMB_SKIP", "S1", 12, 400, "exhausted".to_string());
        assert_eq!(
            event.diag_line(),
            Some("CHAIN_DIAG: ASMB_SKIP,S1,12,400,exhausted".to_string())
        );

        let other = ChainingEvent::ChainClosed {
            cluster_id: 1,
            chain_id: 0,
        };
        assert_eq!(other.diag_line(), None);
    }

    #[rstest]
    fn test_recording_through_reference() {
        let mut recorder = RecordingObserver::new();
        {
            let mut observer: Box<dyn ChainingObserver + '_> = Box::new(&mut recorder);
            observer.on_event(&ChainingEvent::StateChanged {
                cluster_id: 1,
                state: ChainFinderState::Seeded,
            });
        }
        assert_eq!(recorder.states(), vec![ChainFinderState::Seeded]);
    }
}
