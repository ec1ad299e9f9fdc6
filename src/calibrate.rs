//! Calibration registry — empirical scalar/vector implementation selection
//!
//! Every hot operation kind has several numerically-equivalent kernels
//! (scalar plus fixed lane widths). Which one is fastest depends on the
//! host CPU, so the registry benchmarks each supported candidate against
//! synthetic uniform-random input and persists the winner per machine
//! through an injected key-value store. Factories consult the registry at
//! construction time; an operation kind that has never been calibrated
//! reports [`Implementation::Uncalibrated`] and factories fall back to the
//! scalar kernel.
//!
//! Benchmarking runs a warm-up phase (timing discarded, stabilizes caches
//! and branch predictors) before the measured phase, averages wall-clock
//! time per candidate, excludes candidates wider than the hardware's
//! vector registers before measurement, excludes candidates that fail with
//! an error, and breaks ties toward the narrower variant. Calibration runs
//! are expected to be serialized by the caller and not overlapped with
//! live decoding, which would corrupt the timings.
//!
//! ## Example
//!
//! ```rust
//! use rxdsp::calibrate::{CalibrationRegistry, CalibrationType, MemoryStore};
//! use rxdsp::vector::Implementation;
//!
//! let registry = CalibrationRegistry::new(Box::new(MemoryStore::new()));
//! assert_eq!(
//!     registry.implementation(CalibrationType::ComplexMixer),
//!     Implementation::Uncalibrated
//! );
//! ```

use crate::types::{random_samples, random_unit_complex, DspError, DspResult};
use crate::vector::{self, Implementation};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

/// Operation kinds with independently calibrated implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CalibrationType {
    ComplexGain,
    ComplexMixer,
    DcRemovalReal,
    FilterFir,
    FilterHalfBandComplex11Tap,
    FilterHalfBandComplex15Tap,
    FilterHalfBandComplex23Tap,
    FilterHalfBandComplex63Tap,
    FilterHalfBandReal11Tap,
    FilterHalfBandReal15Tap,
    FilterHalfBandReal23Tap,
    FilterHalfBandReal63Tap,
    FilterHalfBandRealDefault,
    FmDemodulator,
    HilbertTransform,
    OscillatorComplex,
    OscillatorReal,
    SampleConverterUnpacked,
    SampleConverterPacked,
}

impl CalibrationType {
    /// Every operation kind, for reset and status iteration.
    pub const ALL: [CalibrationType; 19] = [
        CalibrationType::ComplexGain,
        CalibrationType::ComplexMixer,
        CalibrationType::DcRemovalReal,
        CalibrationType::FilterFir,
        CalibrationType::FilterHalfBandComplex11Tap,
        CalibrationType::FilterHalfBandComplex15Tap,
        CalibrationType::FilterHalfBandComplex23Tap,
        CalibrationType::FilterHalfBandComplex63Tap,
        CalibrationType::FilterHalfBandReal11Tap,
        CalibrationType::FilterHalfBandReal15Tap,
        CalibrationType::FilterHalfBandReal23Tap,
        CalibrationType::FilterHalfBandReal63Tap,
        CalibrationType::FilterHalfBandRealDefault,
        CalibrationType::FmDemodulator,
        CalibrationType::HilbertTransform,
        CalibrationType::OscillatorComplex,
        CalibrationType::OscillatorReal,
        CalibrationType::SampleConverterUnpacked,
        CalibrationType::SampleConverterPacked,
    ];

    /// Stable key for the persistence port.
    pub fn key(&self) -> &'static str {
        match self {
            CalibrationType::ComplexGain => "complex-gain",
            CalibrationType::ComplexMixer => "complex-mixer",
            CalibrationType::DcRemovalReal => "dc-removal-real",
            CalibrationType::FilterFir => "filter-fir",
            CalibrationType::FilterHalfBandComplex11Tap => "filter-half-band-complex-11-tap",
            CalibrationType::FilterHalfBandComplex15Tap => "filter-half-band-complex-15-tap",
            CalibrationType::FilterHalfBandComplex23Tap => "filter-half-band-complex-23-tap",
            CalibrationType::FilterHalfBandComplex63Tap => "filter-half-band-complex-63-tap",
            CalibrationType::FilterHalfBandReal11Tap => "filter-half-band-real-11-tap",
            CalibrationType::FilterHalfBandReal15Tap => "filter-half-band-real-15-tap",
            CalibrationType::FilterHalfBandReal23Tap => "filter-half-band-real-23-tap",
            CalibrationType::FilterHalfBandReal63Tap => "filter-half-band-real-63-tap",
            CalibrationType::FilterHalfBandRealDefault => "filter-half-band-real-default",
            CalibrationType::FmDemodulator => "fm-demodulator",
            CalibrationType::HilbertTransform => "hilbert-transform",
            CalibrationType::OscillatorComplex => "oscillator-complex",
            CalibrationType::OscillatorReal => "oscillator-real",
            CalibrationType::SampleConverterUnpacked => "sample-converter-unpacked",
            CalibrationType::SampleConverterPacked => "sample-converter-packed",
        }
    }

    /// Calibration kind for a complex half-band decimator with a standard
    /// tap count; non-standard counts are not calibrated.
    pub fn for_complex_half_band(taps: usize) -> Option<CalibrationType> {
        match taps {
            11 => Some(CalibrationType::FilterHalfBandComplex11Tap),
            15 => Some(CalibrationType::FilterHalfBandComplex15Tap),
            23 => Some(CalibrationType::FilterHalfBandComplex23Tap),
            63 => Some(CalibrationType::FilterHalfBandComplex63Tap),
            _ => None,
        }
    }

    /// Calibration kind for a real half-band decimator; non-standard tap
    /// counts share the default record.
    pub fn for_real_half_band(taps: usize) -> CalibrationType {
        match taps {
            11 => CalibrationType::FilterHalfBandReal11Tap,
            15 => CalibrationType::FilterHalfBandReal15Tap,
            23 => CalibrationType::FilterHalfBandReal23Tap,
            63 => CalibrationType::FilterHalfBandReal63Tap,
            _ => CalibrationType::FilterHalfBandRealDefault,
        }
    }
}

impl fmt::Display for CalibrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Durable string key-value persistence port for calibration records.
///
/// The concrete backing store (preferences file, database, ...) is an
/// external collaborator; anything that durably maps strings to strings
/// works.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
}

/// In-memory key-value store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    map: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.map.remove(key);
    }
}

/// One benchmarkable operation kind.
///
/// `execute` runs the operation once over its synthetic input using the
/// requested variant; the registry supplies iteration counts and timing.
pub trait CalibrationPlugin: Send {
    fn calibration_type(&self) -> CalibrationType;
    fn execute(&mut self, variant: Implementation) -> DspResult<()>;
}

/// Closure-backed plugin used for the built-in operation set.
pub struct FnPlugin {
    calibration_type: CalibrationType,
    operation: Box<dyn FnMut(Implementation) -> DspResult<()> + Send>,
}

impl FnPlugin {
    pub fn new(
        calibration_type: CalibrationType,
        operation: Box<dyn FnMut(Implementation) -> DspResult<()> + Send>,
    ) -> Self {
        Self { calibration_type, operation }
    }
}

impl CalibrationPlugin for FnPlugin {
    fn calibration_type(&self) -> CalibrationType {
        self.calibration_type
    }

    fn execute(&mut self, variant: Implementation) -> DspResult<()> {
        (self.operation)(variant)
    }
}

/// Benchmark phase tuning.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Discarded timing passes per candidate before measurement.
    pub warmup_passes: usize,
    /// Timed passes per candidate; their mean decides the winner.
    pub measured_passes: usize,
    /// Operation executions per timing pass.
    pub iterations_per_pass: usize,
    /// Widest vector register considered, in bits. Defaults to the host's
    /// detected width; candidates wider than this are excluded before the
    /// measured phase.
    pub max_width_bits: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            warmup_passes: 5,
            measured_passes: 10,
            iterations_per_pass: 50,
            max_width_bits: vector::max_supported(),
        }
    }
}

/// Mean measured timing for one candidate variant.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateTiming {
    pub variant: Implementation,
    pub mean_nanos: f64,
}

/// Outcome of one calibration run.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub calibration_type: CalibrationType,
    pub selected: Implementation,
    pub timings: Vec<CandidateTiming>,
}

/// Registry of calibration records, explicitly constructed and passed to
/// factories by reference; there is no process-wide singleton.
///
/// Reads (`implementation`) are cheap and lock only a small cache;
/// mutation (`calibrate`, `reset`) takes `&mut self`, which also enforces
/// the requirement that calibration runs are serialized.
pub struct CalibrationRegistry {
    store: Mutex<Box<dyn KeyValueStore>>,
    cache: Mutex<HashMap<CalibrationType, Implementation>>,
    plugins: Vec<Box<dyn CalibrationPlugin>>,
    config: CalibrationConfig,
}

impl CalibrationRegistry {
    /// Create a registry with the built-in operation plugins and default
    /// benchmark configuration.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self::with_plugins(store, default_plugins(), CalibrationConfig::default())
    }

    /// Create a registry with an explicit plugin set and configuration.
    pub fn with_plugins(
        store: Box<dyn KeyValueStore>,
        plugins: Vec<Box<dyn CalibrationPlugin>>,
        config: CalibrationConfig,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            cache: Mutex::new(HashMap::new()),
            plugins,
            config,
        }
    }

    /// Implementation chosen for an operation kind, or `Uncalibrated` when
    /// no record exists. Records load lazily from the store and are cached
    /// for the life of the process.
    pub fn implementation(&self, calibration_type: CalibrationType) -> Implementation {
        let mut cache = self.cache.lock().expect("calibration cache poisoned");
        if let Some(&cached) = cache.get(&calibration_type) {
            return cached;
        }

        let loaded = self
            .store
            .lock()
            .expect("calibration store poisoned")
            .get(&record_key(calibration_type))
            .and_then(|value| value.parse().ok())
            .unwrap_or(Implementation::Uncalibrated);
        cache.insert(calibration_type, loaded);
        loaded
    }

    /// True when every registered operation kind has a calibration record.
    pub fn is_calibrated(&self) -> bool {
        self.plugins
            .iter()
            .all(|plugin| self.implementation(plugin.calibration_type()) != Implementation::Uncalibrated)
    }

    /// Benchmark all candidates for one operation kind and persist the
    /// fastest.
    pub fn calibrate(&mut self, calibration_type: CalibrationType) -> DspResult<CalibrationReport> {
        let config = self.config.clone();
        let plugin = self
            .plugins
            .iter_mut()
            .find(|plugin| plugin.calibration_type() == calibration_type)
            .ok_or_else(|| {
                DspError::Calibration(format!("no plugin registered for {calibration_type}"))
            })?;

        let report = benchmark(plugin.as_mut(), &config);

        match report.selected {
            Implementation::Uncalibrated => {
                tracing::warn!(
                    kind = %calibration_type,
                    "every candidate failed; operation remains uncalibrated"
                );
                self.record(calibration_type, Implementation::Uncalibrated, false);
            }
            selected => {
                tracing::info!(kind = %calibration_type, %selected, "calibration complete");
                self.record(calibration_type, selected, true);
            }
        }

        Ok(report)
    }

    /// Calibrate every registered operation kind that is not yet
    /// calibrated.
    pub fn calibrate_all(&mut self) -> DspResult<Vec<CalibrationReport>> {
        let pending: Vec<CalibrationType> = self
            .plugins
            .iter()
            .map(|plugin| plugin.calibration_type())
            .filter(|&calibration_type| {
                self.implementation(calibration_type) == Implementation::Uncalibrated
            })
            .collect();

        if pending.is_empty() {
            tracing::info!("all operation kinds already calibrated");
            return Ok(Vec::new());
        }

        tracing::info!(count = pending.len(), "calibrating for this machine; this may take a while");
        let mut reports = Vec::with_capacity(pending.len());
        for calibration_type in pending {
            reports.push(self.calibrate(calibration_type)?);
        }
        Ok(reports)
    }

    /// Clear the record for one operation kind back to `Uncalibrated`.
    pub fn reset(&mut self, calibration_type: CalibrationType) {
        self.store
            .lock()
            .expect("calibration store poisoned")
            .remove(&record_key(calibration_type));
        self.cache
            .lock()
            .expect("calibration cache poisoned")
            .insert(calibration_type, Implementation::Uncalibrated);
    }

    /// Clear every record back to `Uncalibrated`.
    pub fn reset_all(&mut self) {
        for calibration_type in CalibrationType::ALL {
            self.reset(calibration_type);
        }
    }

    fn record(&self, calibration_type: CalibrationType, selected: Implementation, persist: bool) {
        if persist {
            self.store
                .lock()
                .expect("calibration store poisoned")
                .put(&record_key(calibration_type), selected.as_str());
        }
        self.cache
            .lock()
            .expect("calibration cache poisoned")
            .insert(calibration_type, selected);
    }
}

fn record_key(calibration_type: CalibrationType) -> String {
    format!("calibration.{}.implementation", calibration_type.key())
}

/// Warm up, measure, and select the fastest supported candidate.
///
/// Returns `Uncalibrated` as the selection when every candidate failed.
fn benchmark(plugin: &mut dyn CalibrationPlugin, config: &CalibrationConfig) -> CalibrationReport {
    let calibration_type = plugin.calibration_type();
    let candidates: Vec<Implementation> = Implementation::CANDIDATES
        .iter()
        .copied()
        .filter(|candidate| candidate.is_supported(config.max_width_bits))
        .collect();

    let mut timings = Vec::new();
    let mut selected = Implementation::Uncalibrated;
    let mut best_mean = f64::INFINITY;

    'candidates: for candidate in candidates {
        // Warm-up: same work as the measured phase, timing discarded.
        for _ in 0..config.warmup_passes {
            if let Err(error) = run_pass(plugin, candidate, config.iterations_per_pass) {
                tracing::warn!(
                    kind = %calibration_type,
                    %candidate,
                    %error,
                    "candidate failed during warm-up; excluding"
                );
                continue 'candidates;
            }
        }

        let mut total_nanos = 0.0f64;
        for _ in 0..config.measured_passes {
            let start = Instant::now();
            if let Err(error) = run_pass(plugin, candidate, config.iterations_per_pass) {
                tracing::warn!(
                    kind = %calibration_type,
                    %candidate,
                    %error,
                    "candidate failed during measurement; excluding"
                );
                continue 'candidates;
            }
            total_nanos += start.elapsed().as_nanos() as f64;
        }

        let mean_nanos = total_nanos / config.measured_passes as f64;
        timings.push(CandidateTiming { variant: candidate, mean_nanos });

        // Strict comparison: ties keep the earlier, narrower candidate.
        if mean_nanos < best_mean {
            best_mean = mean_nanos;
            selected = candidate;
        }
    }

    CalibrationReport { calibration_type, selected, timings }
}

fn run_pass(
    plugin: &mut dyn CalibrationPlugin,
    candidate: Implementation,
    iterations: usize,
) -> DspResult<()> {
    for _ in 0..iterations {
        plugin.execute(candidate)?;
    }
    Ok(())
}

/// Built-in plugin set covering every calibrated operation in the crate.
///
/// Each plugin owns a synthetic uniform-random input buffer in [-1, 1] and
/// executes its operation once per call with the requested variant.
pub fn default_plugins() -> Vec<Box<dyn CalibrationPlugin>> {
    use crate::buffer::{PackedBufferIterator, UnpackedBufferIterator, FRAGMENT_SIZE};
    use crate::dc_removal::DcRemovalFilter;
    use crate::filter_design;
    use crate::fir::RealFirFilter;
    use crate::fm_demod::FmDemodulator;
    use crate::gain::ComplexGain;
    use crate::half_band::{ComplexHalfBandDecimator, RealHalfBandDecimator};
    use crate::hilbert::{HilbertTransform, I_OVERLAP, Q_OVERLAP};
    use crate::mixer::ComplexMixer;
    use crate::oscillator::{ComplexOscillator, RealOscillator};

    const BUFFER_SIZE: usize = 2048;

    let mut plugins: Vec<Box<dyn CalibrationPlugin>> = Vec::new();

    {
        let block = random_unit_complex(BUFFER_SIZE, 0);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::ComplexGain,
            Box::new(move |variant| {
                ComplexGain::new(0.7, variant).apply(&block)?;
                Ok(())
            }),
        )));
    }

    {
        let block = random_unit_complex(BUFFER_SIZE, 0);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::ComplexMixer,
            Box::new(move |variant| {
                let mut mixer = ComplexMixer::new(2500.0, 48000.0, variant)?;
                mixer.mix(&block)?;
                Ok(())
            }),
        )));
    }

    {
        let samples = random_samples(BUFFER_SIZE);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::DcRemovalReal,
            Box::new(move |variant| {
                let mut filter = DcRemovalFilter::new(0.15, variant);
                filter.process(&samples)?;
                Ok(())
            }),
        )));
    }

    {
        let coefficients = random_samples(63);
        let samples = random_samples(BUFFER_SIZE);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::FilterFir,
            Box::new(move |variant| {
                let mut filter = RealFirFilter::new(&coefficients, variant)?;
                filter.process(&samples)?;
                Ok(())
            }),
        )));
    }

    for (taps, calibration_type) in [
        (11, CalibrationType::FilterHalfBandComplex11Tap),
        (15, CalibrationType::FilterHalfBandComplex15Tap),
        (23, CalibrationType::FilterHalfBandComplex23Tap),
        (63, CalibrationType::FilterHalfBandComplex63Tap),
    ] {
        let Ok(coefficients) = filter_design::half_band(taps) else { continue };
        let samples = random_samples(BUFFER_SIZE * 2);
        plugins.push(Box::new(FnPlugin::new(
            calibration_type,
            Box::new(move |variant| {
                let mut filter = ComplexHalfBandDecimator::new(&coefficients, variant)?;
                filter.process(&samples)?;
                Ok(())
            }),
        )));
    }

    for (taps, calibration_type) in [
        (11, CalibrationType::FilterHalfBandReal11Tap),
        (15, CalibrationType::FilterHalfBandReal15Tap),
        (23, CalibrationType::FilterHalfBandReal23Tap),
        (63, CalibrationType::FilterHalfBandReal63Tap),
        (31, CalibrationType::FilterHalfBandRealDefault),
    ] {
        let Ok(coefficients) = filter_design::half_band(taps) else { continue };
        let samples = random_samples(BUFFER_SIZE);
        plugins.push(Box::new(FnPlugin::new(
            calibration_type,
            Box::new(move |variant| {
                let mut filter = RealHalfBandDecimator::new(&coefficients, variant)?;
                filter.process(&samples)?;
                Ok(())
            }),
        )));
    }

    {
        let block = random_unit_complex(BUFFER_SIZE, 0);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::FmDemodulator,
            Box::new(move |variant| {
                let mut demodulator = FmDemodulator::new(5000.0, 48000.0, variant)?;
                demodulator.demodulate(&block.i, &block.q)?;
                Ok(())
            }),
        )));
    }

    {
        let samples = random_samples(BUFFER_SIZE);
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::HilbertTransform,
            Box::new(move |variant| {
                let mut hilbert = HilbertTransform::new(variant)?;
                hilbert.process(&samples)?;
                Ok(())
            }),
        )));
    }

    plugins.push(Box::new(FnPlugin::new(
        CalibrationType::OscillatorComplex,
        Box::new(move |variant| {
            let mut oscillator = ComplexOscillator::new(2500.0, 48000.0, variant)?;
            oscillator.generate(BUFFER_SIZE)?;
            Ok(())
        }),
    )));

    plugins.push(Box::new(FnPlugin::new(
        CalibrationType::OscillatorReal,
        Box::new(move |variant| {
            let mut oscillator = RealOscillator::new(2500.0, 48000.0, variant)?;
            oscillator.generate(BUFFER_SIZE)?;
            Ok(())
        }),
    )));

    {
        let bytes: Vec<u8> = random_samples(FRAGMENT_SIZE * 4)
            .iter()
            .map(|sample| ((sample + 1.0) * 127.0) as u8)
            .collect();
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::SampleConverterUnpacked,
            Box::new(move |variant| {
                let mut iterator = UnpackedBufferIterator::new(
                    &bytes,
                    &[0.0; I_OVERLAP],
                    &[0.0; Q_OVERLAP],
                    0,
                    variant,
                )?;
                while iterator.has_next() {
                    iterator.next_fragment()?;
                }
                Ok(())
            }),
        )));
    }

    {
        let bytes: Vec<u8> = random_samples(FRAGMENT_SIZE * 3)
            .iter()
            .map(|sample| ((sample + 1.0) * 127.0) as u8)
            .collect();
        plugins.push(Box::new(FnPlugin::new(
            CalibrationType::SampleConverterPacked,
            Box::new(move |variant| {
                let mut iterator = PackedBufferIterator::new(
                    &bytes,
                    &[0.0; I_OVERLAP],
                    &[0.0; Q_OVERLAP],
                    0,
                    variant,
                )?;
                while iterator.has_next() {
                    iterator.next_fragment()?;
                }
                Ok(())
            }),
        )));
    }

    plugins
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn fast_config() -> CalibrationConfig {
        CalibrationConfig {
            warmup_passes: 1,
            measured_passes: 2,
            iterations_per_pass: 2,
            max_width_bits: 512,
        }
    }

    /// Plugin that records which variants executed and fails for all but
    /// one of them.
    fn selective_plugin(
        winner: Implementation,
        executed: Arc<StdMutex<Vec<Implementation>>>,
    ) -> Box<dyn CalibrationPlugin> {
        Box::new(FnPlugin::new(
            CalibrationType::FilterFir,
            Box::new(move |variant| {
                executed.lock().unwrap().push(variant);
                if variant == winner {
                    Ok(())
                } else {
                    Err(DspError::Calibration("unsupported in test".into()))
                }
            }),
        ))
    }

    #[test]
    fn test_uncalibrated_by_default() {
        let registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            Vec::new(),
            fast_config(),
        );
        assert_eq!(
            registry.implementation(CalibrationType::ComplexMixer),
            Implementation::Uncalibrated
        );
    }

    #[test]
    fn test_candidate_failure_excludes_candidate() {
        let executed = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![selective_plugin(Implementation::Vector128, executed.clone())],
            fast_config(),
        );

        let report = registry.calibrate(CalibrationType::FilterFir).unwrap();
        assert_eq!(report.selected, Implementation::Vector128);
        assert_eq!(report.timings.len(), 1);
        assert_eq!(
            registry.implementation(CalibrationType::FilterFir),
            Implementation::Vector128
        );
    }

    #[test]
    fn test_all_candidates_failing_leaves_uncalibrated() {
        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![Box::new(FnPlugin::new(
                CalibrationType::ComplexGain,
                Box::new(|_| Err(DspError::Calibration("always fails".into()))),
            ))],
            fast_config(),
        );

        let report = registry.calibrate(CalibrationType::ComplexGain).unwrap();
        assert_eq!(report.selected, Implementation::Uncalibrated);
        assert_eq!(
            registry.implementation(CalibrationType::ComplexGain),
            Implementation::Uncalibrated
        );
    }

    #[test]
    fn test_unsupported_widths_never_execute() {
        let executed = Arc::new(StdMutex::new(Vec::new()));
        let mut config = fast_config();
        config.max_width_bits = 128;

        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![selective_plugin(Implementation::Scalar, executed.clone())],
            config,
        );
        registry.calibrate(CalibrationType::FilterFir).unwrap();

        let executed = executed.lock().unwrap();
        assert!(!executed.contains(&Implementation::Vector256));
        assert!(!executed.contains(&Implementation::Vector512));
        assert!(executed.contains(&Implementation::Scalar));
    }

    #[test]
    fn test_calibration_idempotent() {
        let executed = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![selective_plugin(Implementation::Vector64, executed)],
            fast_config(),
        );

        let first = registry.calibrate(CalibrationType::FilterFir).unwrap();
        let second = registry.calibrate(CalibrationType::FilterFir).unwrap();
        assert_eq!(first.selected, second.selected);
    }

    #[test]
    fn test_persisted_record_survives_new_registry() {
        let mut store = MemoryStore::new();
        store.put(
            "calibration.complex-mixer.implementation",
            Implementation::Vector256.as_str(),
        );

        let registry =
            CalibrationRegistry::with_plugins(Box::new(store), Vec::new(), fast_config());
        assert_eq!(
            registry.implementation(CalibrationType::ComplexMixer),
            Implementation::Vector256
        );
    }

    #[test]
    fn test_reset_clears_record() {
        let executed = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![selective_plugin(Implementation::Scalar, executed)],
            fast_config(),
        );

        registry.calibrate(CalibrationType::FilterFir).unwrap();
        assert_ne!(
            registry.implementation(CalibrationType::FilterFir),
            Implementation::Uncalibrated
        );

        registry.reset(CalibrationType::FilterFir);
        assert_eq!(
            registry.implementation(CalibrationType::FilterFir),
            Implementation::Uncalibrated
        );
    }

    #[test]
    fn test_calibrate_all_skips_calibrated_kinds() {
        let executed = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = CalibrationRegistry::with_plugins(
            Box::new(MemoryStore::new()),
            vec![selective_plugin(Implementation::Scalar, executed.clone())],
            fast_config(),
        );

        let first = registry.calibrate_all().unwrap();
        assert_eq!(first.len(), 1);
        assert!(registry.is_calibrated());

        let count_after_first = executed.lock().unwrap().len();
        let second = registry.calibrate_all().unwrap();
        assert!(second.is_empty());
        assert_eq!(executed.lock().unwrap().len(), count_after_first);
    }

    #[test]
    fn test_default_plugins_cover_standard_kinds() {
        let plugins = default_plugins();
        let kinds: Vec<CalibrationType> =
            plugins.iter().map(|plugin| plugin.calibration_type()).collect();
        assert_eq!(kinds.len(), CalibrationType::ALL.len());
        for kind in CalibrationType::ALL {
            assert!(kinds.contains(&kind), "missing plugin for {kind}");
        }
    }
}
