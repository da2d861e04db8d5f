// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Escalating-confidence orientation detection.
//
// OSD is unreliable at low resolution on sparse or noisy pages, so the page is
// classified at a cheap resolution first and only re-rendered at higher
// resolutions while the classifier stays unsure. When every trial is
// inconclusive the last observation wins; a low-confidence page is still
// saved, never failed.

use pagewerk_core::PipelineConfig;
use pagewerk_core::types::{OrientationResult, OsdReading, PageJob};
use tracing::{debug, error, info, instrument, warn};

use super::classifier::OrientationClassifier;
use crate::failures::FailureSink;
use crate::raster::RasterDocument;

/// Knobs of the detection protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorSettings {
    /// Resolution of the first trial.
    pub base_dpi: u32,
    /// Resolution added after each inconclusive trial.
    pub dpi_step: u32,
    /// Confidence accepted without escalation.
    pub confidence_threshold: f32,
    pub max_trials: u32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            base_dpi: 200,
            dpi_step: 100,
            confidence_threshold: 2.0,
            max_trials: 3,
        }
    }
}

impl From<&PipelineConfig> for DetectorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            base_dpi: config.base_dpi,
            dpi_step: config.dpi_step,
            confidence_threshold: config.confidence_threshold,
            max_trials: config.max_trials.max(1),
        }
    }
}

/// Runs the trial loop against an [`OrientationClassifier`].
pub struct OrientationDetector<C> {
    classifier: C,
    settings: DetectorSettings,
}

impl<C: OrientationClassifier> OrientationDetector<C> {
    pub fn new(classifier: C, settings: DetectorSettings) -> Self {
        Self {
            classifier,
            settings,
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Infer the rotation of the single-page document `page`.
    ///
    /// Never fails: render and classifier errors count as zero-confidence,
    /// zero-angle observations and are recorded in `failures`.
    #[instrument(skip_all, fields(source = %job.source.path.display(), page = job.number()))]
    pub fn detect<D: RasterDocument>(
        &self,
        page: &D,
        job: PageJob<'_>,
        failures: &dyn FailureSink,
    ) -> OrientationResult {
        let DetectorSettings {
            base_dpi,
            dpi_step,
            confidence_threshold,
            max_trials,
        } = self.settings;
        let max_trials = max_trials.max(1);

        let mut dpi = base_dpi;
        let mut last = OsdReading::FAILED;

        for trial in 1..=max_trials {
            let attempt = page
                .render_page(0, dpi)
                .and_then(|raster| self.classifier.classify(&raster, dpi));

            let reading = match attempt {
                Ok(reading) => reading,
                Err(err) => {
                    let message = format!(
                        "Orientation detection failed on trial {trial} (DPI={dpi}) \
                         for {}, page {}: {err}",
                        job.source.path.display(),
                        job.number()
                    );
                    error!("{message}");
                    failures.record(&job.source.path, &message);
                    OsdReading::FAILED
                }
            };

            debug!(
                trial,
                dpi,
                rotation = %reading.rotation,
                confidence = reading.confidence,
                "Orientation trial"
            );

            if reading.confidence >= confidence_threshold {
                if trial > 1 {
                    info!(
                        trial,
                        dpi,
                        confidence = reading.confidence,
                        "Orientation ({}) stabilized",
                        reading.rotation
                    );
                }
                return OrientationResult {
                    rotation: reading.rotation,
                    confidence: reading.confidence,
                    trials: trial,
                    confident: true,
                };
            }

            if trial < max_trials {
                warn!(
                    dpi,
                    next_dpi = dpi.saturating_add(dpi_step),
                    "Low orientation confidence ({:.1}); retrying with higher DPI",
                    reading.confidence
                );
            }
            last = reading;
            dpi = dpi.saturating_add(dpi_step);
        }

        warn!(
            trials = max_trials,
            "Max trials reached; using last rotation {} at confidence {:.1}",
            last.rotation,
            last.confidence
        );

        OrientationResult {
            rotation: last.rotation,
            confidence: last.confidence,
            trials: max_trials,
            confident: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDocument, RecordingSink, ScriptedClassifier};
    use pagewerk_core::types::{Rotation, SourceDocument};
    use std::path::Path;

    fn reading(degrees: i32, confidence: f32) -> Result<OsdReading, String> {
        Ok(OsdReading {
            rotation: Rotation::from_degrees(degrees).unwrap(),
            confidence,
        })
    }

    fn source() -> SourceDocument {
        SourceDocument::new("/watch/tenant/doc.pdf", Path::new("/watch"))
    }

    #[test]
    fn confident_first_trial_classifies_once() {
        let classifier = ScriptedClassifier::new().script(1, vec![reading(90, 5.0)]);
        let detector = OrientationDetector::new(classifier, DetectorSettings::default());
        let page = FakeDocument::single(1);
        let src = source();

        let job = PageJob {
            source: &src,
            index: 0,
        };
        let result = detector.detect(&page, job, &RecordingSink::default());

        assert_eq!(result.rotation, Rotation::Cw90);
        assert_eq!(result.trials, 1);
        assert!(result.confident);
        assert_eq!(detector.classifier().calls(), 1);
        assert_eq!(detector.classifier().dpis(), vec![200]);
    }

    #[test]
    fn escalates_resolution_until_confident() {
        let classifier = ScriptedClassifier::new()
            .script(1, vec![reading(0, 0.4), reading(180, 2.0)]);
        let detector = OrientationDetector::new(classifier, DetectorSettings::default());
        let page = FakeDocument::single(1);
        let src = source();

        let job = PageJob {
            source: &src,
            index: 0,
        };
        let result = detector.detect(&page, job, &RecordingSink::default());

        assert_eq!(result.rotation, Rotation::Cw180);
        assert_eq!(result.trials, 2);
        assert_eq!(detector.classifier().dpis(), vec![200, 300]);
    }

    #[test]
    fn exhausted_trials_return_last_observation() {
        let classifier = ScriptedClassifier::new().script(
            1,
            vec![reading(90, 1.0), reading(180, 0.5), reading(270, 1.9)],
        );
        let detector = OrientationDetector::new(classifier, DetectorSettings::default());
        let page = FakeDocument::single(1);
        let src = source();

        let job = PageJob {
            source: &src,
            index: 0,
        };
        let result = detector.detect(&page, job, &RecordingSink::default());

        assert_eq!(detector.classifier().calls(), 3);
        assert_eq!(detector.classifier().dpis(), vec![200, 300, 400]);
        assert_eq!(result.rotation, Rotation::Cw270);
        assert!(!result.confident);
        assert_eq!(result.trials, 3);
    }

    #[test]
    fn classifier_errors_degrade_to_zero_observation() {
        let classifier = ScriptedClassifier::new().script(
            1,
            vec![
                reading(90, 1.0),
                Err("corrupt raster".into()),
                Err("corrupt raster".into()),
            ],
        );
        let detector = OrientationDetector::new(classifier, DetectorSettings::default());
        let page = FakeDocument::single(1);
        let sink = RecordingSink::default();
        let src = source();

        let result = detector.detect(&page, PageJob { source: &src, index: 0 }, &sink);

        assert_eq!(detector.classifier().calls(), 3);
        assert_eq!(result.rotation, Rotation::None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(sink.records().len(), 2);
        assert!(sink.records()[0].1.contains("trial 2"));
    }

    #[test]
    fn respects_configured_trial_count() {
        let classifier = ScriptedClassifier::new();
        let settings = DetectorSettings {
            max_trials: 5,
            dpi_step: 50,
            ..Default::default()
        };
        let detector = OrientationDetector::new(classifier, settings);
        let page = FakeDocument::single(1);
        let src = source();

        detector.detect(&page, PageJob { source: &src, index: 0 }, &RecordingSink::default());

        assert_eq!(detector.classifier().dpis(), vec![200, 250, 300, 350, 400]);
    }

    #[test]
    fn escalation_saturates_at_max_dpi() {
        let settings = DetectorSettings {
            base_dpi: u32::MAX - 10,
            dpi_step: u32::MAX,
            max_trials: 3,
            ..Default::default()
        };
        let detector = OrientationDetector::new(ScriptedClassifier::new(), settings);
        let page = FakeDocument::single(1);
        let src = source();
        let job = PageJob {
            source: &src,
            index: 0,
        };

        let result = detector.detect(&page, job, &RecordingSink::default());

        assert_eq!(result.trials, 3);
        assert_eq!(
            detector.classifier().dpis(),
            vec![u32::MAX - 10, u32::MAX, u32::MAX]
        );
    }
}
