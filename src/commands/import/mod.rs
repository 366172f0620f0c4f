mod extract;
mod merge;
mod overrides;
mod run;
mod sources;

pub use run::run;
