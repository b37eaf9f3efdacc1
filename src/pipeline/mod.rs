mod pump;

pub use pump::{PipelineState, Pump, PumpOptions, PumpStats, StageOutcome};
