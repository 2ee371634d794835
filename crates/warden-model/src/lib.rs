mod domain;
pub use domain::*;

mod error;
pub use error::{ModelError, ModelResult};

mod definition;
pub use definition::ServiceDefinition;

mod status;
pub use status::ControllerStatus;

mod record;
pub use record::ControllerRecord;

mod event;
pub use event::{Delimiters, MonitorEvent, Subject};
