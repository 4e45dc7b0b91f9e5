//! View rendering hook used by [`Response::render`](crate::Response::render).

use serde_json::Value;

use crate::middleware::HandlerError;

/// Turns a view name and its data into HTML
pub trait ViewRenderer {
    fn render(&self, view: &str, data: &Value) -> Result<String, HandlerError>;
}

impl<F> ViewRenderer for F
where
    F: Fn(&str, &Value) -> Result<String, HandlerError>,
{
    fn render(&self, view: &str, data: &Value) -> Result<String, HandlerError> {
        self(view, data)
    }
}
