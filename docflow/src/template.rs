//! Render templates.
//!
//! A [`TemplateSet`] is loaded once at startup and then only read, so render
//! workers share it behind an `Arc`. Every set registers the `convert_time`
//! helper, both as a filter (`{{ ts | convert_time }}`) and as a function
//! (`{{ convert_time(ts=ts) }}`), which shows a unix timestamp as local time.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tera::{Context, Tera, Value};

use crate::errors::{DocflowError, ItemError};
use crate::utils::format_local_time;

/// Template shipped with the crate, used when no template file is given.
pub const BUILTIN_TEMPLATE: &str = include_str!("../templates/thread.html");

/// Name under which the built-in template is registered.
pub const BUILTIN_TEMPLATE_NAME: &str = "thread.html";

/// An immutable, named template with the docflow helpers registered.
#[derive(Debug)]
pub struct TemplateSet {
    tera: Tera,
    name: String,
}

impl TemplateSet {
    /// Loads the template from a file. The file name becomes the template name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the template does not parse.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DocflowError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| DocflowError::Config(format!("not a template file: {}", path.display())))?;
        let source = std::fs::read_to_string(path)?;
        Self::from_source(name, &source)
    }

    /// Builds a template from source text.
    ///
    /// # Errors
    ///
    /// Returns `DocflowError::Template` if the template does not parse.
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self, DocflowError> {
        let name = name.into();
        let mut tera = Tera::default();
        tera.register_filter("convert_time", convert_time_filter);
        tera.register_function("convert_time", convert_time_function);
        // HTML-escape output regardless of the template's file name.
        tera.autoescape_on(vec![""]);
        tera.add_raw_template(&name, source)?;
        Ok(Self { tera, name })
    }

    /// The built-in thread template.
    ///
    /// # Errors
    ///
    /// Only fails if the shipped template is broken.
    pub fn builtin() -> Result<Self, DocflowError> {
        Self::from_source(BUILTIN_TEMPLATE_NAME, BUILTIN_TEMPLATE)
    }

    /// The template name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders a serializable value as the template context.
    ///
    /// # Errors
    ///
    /// Returns `ItemError::Render` if the context does not serialize or the
    /// template fails at render time.
    pub fn render<T: Serialize>(&self, context: &T) -> Result<String, ItemError> {
        let context = Context::from_serialize(context)?;
        Ok(self.tera.render(&self.name, &context)?)
    }
}

fn timestamp_arg(value: &Value) -> tera::Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| tera::Error::msg(format!("convert_time expects an integer timestamp, got {value}")))
}

fn convert(ts: i64) -> tera::Result<Value> {
    format_local_time(ts)
        .map(Value::String)
        .ok_or_else(|| tera::Error::msg(format!("timestamp {ts} is out of range")))
}

#[allow(clippy::implicit_hasher)]
fn convert_time_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    convert(timestamp_arg(value)?)
}

#[allow(clippy::implicit_hasher)]
fn convert_time_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let ts = args
        .get("ts")
        .ok_or_else(|| tera::Error::msg("convert_time requires a `ts` argument"))?;
    convert(timestamp_arg(ts)?)
}
