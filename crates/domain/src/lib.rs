pub mod completion;
pub mod entities;
pub mod ports;
pub mod repositories;
pub mod value_objects;

pub use completion::*;
pub use entities::*;
pub use ports::*;
pub use repositories::*;
pub use sms_errors::{SmsError, SmsResult};
pub use value_objects::*;
