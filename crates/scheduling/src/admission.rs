//! Saturation-based admission control

use std::sync::Arc;

use tracing::debug;

use llm_inference_director_core::{Criticality, DirectorError, Result};

use crate::saturation::SaturationDetector;

/// Decides whether a request enters the scheduling pipeline.
///
/// Critical requests always pass. Everything else is shed while the pool is
/// saturated; shed requests are never retried here.
pub struct AdmissionController {
    detector: Arc<dyn SaturationDetector>,
}

impl AdmissionController {
    /// Create a controller over the given saturation signal
    pub fn new(detector: Arc<dyn SaturationDetector>) -> Self {
        Self { detector }
    }

    /// Admit or shed a request of the given criticality
    pub fn admit(&self, criticality: Criticality) -> Result<()> {
        if criticality == Criticality::Critical {
            debug!("critical request bypasses saturation check");
            return Ok(());
        }

        if self.detector.is_saturated() {
            return Err(DirectorError::resource_exhausted(
                "pool is saturated, dropping non-critical request",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedDetector {
        saturated: bool,
        consulted: AtomicUsize,
    }

    impl FixedDetector {
        fn new(saturated: bool) -> Self {
            Self {
                saturated,
                consulted: AtomicUsize::new(0),
            }
        }
    }

    impl SaturationDetector for FixedDetector {
        fn is_saturated(&self) -> bool {
            self.consulted.fetch_add(1, Ordering::SeqCst);
            self.saturated
        }
    }

    #[test]
    fn test_standard_admitted_when_not_saturated() {
        let controller = AdmissionController::new(Arc::new(FixedDetector::new(false)));
        assert!(controller.admit(Criticality::Standard).is_ok());
        assert!(controller.admit(Criticality::Sheddable).is_ok());
    }

    #[test]
    fn test_standard_shed_when_saturated() {
        let controller = AdmissionController::new(Arc::new(FixedDetector::new(true)));
        let err = controller.admit(Criticality::Standard).unwrap_err();
        assert!(matches!(err, DirectorError::ResourceExhausted(_)));
    }

    #[test]
    fn test_critical_bypasses_detector() {
        let detector = Arc::new(FixedDetector::new(true));
        let controller = AdmissionController::new(detector.clone());
        assert!(controller.admit(Criticality::Critical).is_ok());
        // The detector must not even be consulted for critical traffic.
        assert_eq!(detector.consulted.load(Ordering::SeqCst), 0);
    }
}
