pub mod limits;
pub mod settings;

pub use limits::*;
pub use settings::Settings;
