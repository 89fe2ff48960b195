//! Predicate builders for common property checks.
//!
//! ```ignore
//! let predicate = props::all(vec![
//!     Box::new(props::prop_eq("page_url_path", "/education")),
//!     Box::new(props::text_contains("see the lessons")),
//! ]);
//! ```

use telltale_capture::{AnalyticsEvent, PropertyValue};

/// A boxed predicate, as stored in a [`Scenario`](crate::Scenario).
pub type BoxedPredicate = Box<dyn Fn(&AnalyticsEvent) -> bool + Send + Sync>;

/// `event_properties[key] == value`, comparing numbers numerically.
pub fn prop_eq(
    key: impl Into<String>,
    value: impl Into<PropertyValue>,
) -> impl Fn(&AnalyticsEvent) -> bool + Send + Sync {
    let key = key.into();
    let value = value.into();
    move |event| event.property_eq(&key, value.clone())
}

/// `event_properties[key]` is a string containing `needle`.
pub fn prop_str_contains(
    key: impl Into<String>,
    needle: impl Into<String>,
) -> impl Fn(&AnalyticsEvent) -> bool + Send + Sync {
    let key = key.into();
    let needle = needle.into();
    move |event| event.str_property(&key).is_some_and(|s| s.contains(&needle))
}

/// `event_properties[key]` is an array holding the string `needle`.
pub fn array_contains(
    key: impl Into<String>,
    needle: impl Into<String>,
) -> impl Fn(&AnalyticsEvent) -> bool + Send + Sync {
    let key = key.into();
    let needle = needle.into();
    move |event| {
        event
            .property(&key)
            .is_some_and(|v| v.array_contains_str(&needle))
    }
}

/// The lowercased text of all string and number properties contains `needle`.
pub fn text_contains(needle: impl Into<String>) -> impl Fn(&AnalyticsEvent) -> bool + Send + Sync {
    let needle = needle.into().to_lowercase();
    move |event| event.property_text().contains(&needle)
}

/// True when every predicate holds.
#[must_use]
pub fn all(predicates: Vec<BoxedPredicate>) -> BoxedPredicate {
    Box::new(move |event| predicates.iter().all(|p| p(event)))
}
