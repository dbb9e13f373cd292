pub mod functions;
pub mod run;
pub mod validate;

pub use functions::FunctionsCommand;
pub use run::RunCommand;
pub use validate::ValidateCommand;
