//! Scan Coordinator
//!
//! Runs scan cycles over configured symbols and timeframes, wiring market
//! data, signal fusion, multi-timeframe confluence, trade planning and the
//! risk gate together, and emits deduplicated alerts.

pub mod alerts;
pub mod config;
pub mod coordinator;
pub mod logging;
pub mod planner;
pub mod report;
pub mod state;

pub use alerts::{Alert, AlertSink, InMemoryAlertSink};
pub use config::{create_config_template, load_config, save_config, ScanConfig, ScannerConfig};
pub use coordinator::{CycleOutcome, ScanCoordinator};
pub use logging::init_logging;
pub use planner::{PlannerConfig, TradePlanner};
pub use report::{ScanReport, SymbolOutcome, SymbolReport};
pub use state::{ScanState, SymbolRecord};
