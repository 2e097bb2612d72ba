//! Data layer shared by the viewer core and the command-line tools:
//! range notation, unit conversion, persisted controller state and
//! configuration.

pub mod config;
pub mod ranges;
pub mod state;
pub mod units;

pub use config::{load_config, ConfigError, GeneEntry, ViewerConfig};
pub use ranges::{FormatError, Range, RangeList};
pub use state::{ControllerSnapshot, DecodeError, SelectionData, Settings, Track, Unit, VariableId, Vec3};
pub use units::{ConversionError, Interval};
