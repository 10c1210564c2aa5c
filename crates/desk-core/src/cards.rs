//! Card template expansion: template + data -> rendered card payload.
//!
//! Templates are JSON documents with minijinja placeholders; expansion is
//! a pure function of the template and the data bag. Card layout itself
//! is owned by the templates, not by any code here.

use minijinja::Environment;
use serde_json::Value;
use thiserror::Error;

pub const CREATE_TICKET_CARD_TEMPLATE: &str = include_str!("../templates/create_ticket_card.json");
pub const TICKET_CARD_TEMPLATE: &str = include_str!("../templates/ticket_card.json");

#[derive(Debug, Error)]
pub enum CardError {
    #[error("card template render failed: {0}")]
    Template(String),
    #[error("rendered card is not valid JSON: {0}")]
    InvalidJson(String),
}

/// Expands `template` with `data` and parses the result back into a JSON
/// card payload.
pub fn render_card(template: &str, data: &Value) -> Result<Value, CardError> {
    let mut environment = Environment::new();
    environment
        .add_template("card", template)
        .map_err(|error| CardError::Template(error.to_string()))?;
    let rendered = environment
        .get_template("card")
        .map_err(|error| CardError::Template(error.to_string()))?
        .render(data)
        .map_err(|error| CardError::Template(error.to_string()))?;
    serde_json::from_str(&rendered).map_err(|error| CardError::InvalidJson(error.to_string()))
}
