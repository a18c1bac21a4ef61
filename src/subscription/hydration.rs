use super::Subscription;
use crate::template::{TemplateCache, TemplateError};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Subscription property that failed to hydrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HydrationField {
    Name,
    Topic,
    Filter,
    BodyTemplate,
    Method,
    Url,
    Header(String),
}

impl fmt::Display for HydrationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HydrationField::Name => f.write_str("name"),
            HydrationField::Topic => f.write_str("topic"),
            HydrationField::Filter => f.write_str("filter"),
            HydrationField::BodyTemplate => f.write_str("body template"),
            HydrationField::Method => f.write_str("method"),
            HydrationField::Url => f.write_str("url"),
            HydrationField::Header(key) => write!(f, "header {key}"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("unable to hydrate templated subscription property {field}: {source}")]
pub struct HydrationError {
    pub field: HydrationField,
    #[source]
    pub source: TemplateError,
}

/// Render every templated field of `subscription` against `params`.
///
/// `params["tpl"]` is set to the subscription's template parameters. The
/// input is left untouched and a hydrated copy is returned.
pub fn apply_placeholders(
    templates: &TemplateCache,
    subscription: &Subscription,
    params: &Map<String, Value>,
) -> Result<Subscription, HydrationError> {
    let mut bag = params.clone();
    bag.insert(
        "tpl".to_string(),
        Value::Object(subscription.template_parameters.clone()),
    );
    let bag = Value::Object(bag);

    let render = |field: HydrationField, source: &str| {
        templates
            .render_inline(source, &bag)
            .map_err(|source| HydrationError { field, source })
    };

    let mut hydrated = subscription.clone();
    hydrated.name = render(HydrationField::Name, &subscription.name)?;
    hydrated.topic = render(HydrationField::Topic, &subscription.topic)?;
    hydrated.filter = render(HydrationField::Filter, &subscription.filter)?;
    hydrated.body_template = render(HydrationField::BodyTemplate, &subscription.body_template)?;
    hydrated.method = render(HydrationField::Method, &subscription.method)?;
    hydrated.url = render(HydrationField::Url, &subscription.url)?;
    for (key, value) in hydrated.headers.iter_mut() {
        *value = render(HydrationField::Header(key.clone()), &subscription.headers[key])?;
    }

    Ok(hydrated)
}
