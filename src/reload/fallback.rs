//! Failure reporting and fallback substitution.

use std::path::{Path, PathBuf};

use crate::error::LoadError;
use crate::script::Value;

/// Receives successfully loaded exports.
pub type ValueCallback = Box<dyn FnMut(&Value)>;
/// Receives the formatted report of every failure.
pub type ErrorCallback = Box<dyn FnMut(&str)>;

pub struct ErrorHandler {
    fallback: Option<PathBuf>,
    on_value: ValueCallback,
    on_error: Option<ErrorCallback>,
}

impl ErrorHandler {
    pub fn new(
        fallback: Option<PathBuf>,
        on_value: ValueCallback,
        on_error: Option<ErrorCallback>,
    ) -> Self {
        Self {
            fallback,
            on_value,
            on_error,
        }
    }

    pub fn deliver(&mut self, value: &Value) {
        (self.on_value)(value);
    }

    /// Hand a failure to `on_error`, or log it when there is no callback.
    pub fn report(&mut self, err: &LoadError) {
        let message = err.report();
        match &mut self.on_error {
            Some(on_error) => on_error(&message),
            None => crate::logger::status_error("load failed", &message),
        }
    }

    /// Report `err` and substitute the fallback module.
    ///
    /// Without `on_error` or a fallback the error is returned unreported.
    /// A failing fallback is returned as well; it is never retried.
    pub fn handle(
        &mut self,
        err: LoadError,
        load: impl FnOnce(&Path) -> Result<Value, LoadError>,
    ) -> Result<Option<Value>, LoadError> {
        if self.on_error.is_none() && self.fallback.is_none() {
            return Err(err);
        }
        self.report(&err);

        let Some(fallback) = self.fallback.clone() else {
            return Ok(None);
        };
        crate::log!("reload"; "loading fallback {}", fallback.display());
        let value = load(&fallback)?;
        self.deliver(&value);
        Ok(Some(value))
    }
}
