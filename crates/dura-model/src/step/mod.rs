mod encoding;
pub use encoding::TextEncoding;

mod options;
pub use options::StepOptions;

mod value;
pub use value::StepValue;
