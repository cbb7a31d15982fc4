//! The compiler backend seam.
//!
//! Legality checking and execution belong to an external compiler. A
//! schedule only needs the two answers below, so anything that can give
//! them (a process, a service, a test double) is a backend.

use crate::utils::errors::BackendError;

/// Verdict of a legality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Legality {
    /// The transformed program preserves the original semantics
    Legal,
    /// The backend rejected the program, with its reason
    Illegal(String),
}

impl Legality {
    /// Check if the verdict is [`Legality::Legal`].
    pub fn is_legal(&self) -> bool {
        matches!(self, Legality::Legal)
    }
}

/// External compiler that checks and runs transformation programs.
pub trait CompilerBackend {
    /// Check the legality of `program` using the `legality` check string.
    fn check_legality(&mut self, program: &str, legality: &str) -> Result<Legality, BackendError>;

    /// Compile and run `program` `runs` times, returning one time per run.
    fn execute(&mut self, program: &str, runs: usize) -> Result<Vec<f64>, BackendError>;
}

impl<B: CompilerBackend + ?Sized> CompilerBackend for &mut B {
    fn check_legality(&mut self, program: &str, legality: &str) -> Result<Legality, BackendError> {
        (**self).check_legality(program, legality)
    }

    fn execute(&mut self, program: &str, runs: usize) -> Result<Vec<f64>, BackendError> {
        (**self).execute(program, runs)
    }
}

impl<B: CompilerBackend + ?Sized> CompilerBackend for Box<B> {
    fn check_legality(&mut self, program: &str, legality: &str) -> Result<Legality, BackendError> {
        (**self).check_legality(program, legality)
    }

    fn execute(&mut self, program: &str, runs: usize) -> Result<Vec<f64>, BackendError> {
        (**self).execute(program, runs)
    }
}
