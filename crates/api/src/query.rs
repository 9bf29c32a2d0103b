//! Query-string parameter types for the saved-search endpoints.

use autobridge_core::error::CoreError;
use autobridge_core::saved_search::Frequency;
use autobridge_core::types::PageRequest;
use autobridge_db::repositories::SavedSearchFilter;
use serde::Deserialize;

/// `?page=&page_size=` for the matches endpoint. Values are clamped by
/// [`PageRequest::new`].
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl PageParams {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }
}

/// `?enabled=&frequency=&page=&page_size=` for the list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ListSavedSearchParams {
    pub enabled: Option<bool>,
    pub frequency: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListSavedSearchParams {
    /// Parse the filter half. An unknown frequency is a validation error,
    /// not an empty list.
    pub fn filter(&self) -> Result<SavedSearchFilter, CoreError> {
        let frequency = self
            .frequency
            .as_deref()
            .map(str::parse::<Frequency>)
            .transpose()?;
        Ok(SavedSearchFilter {
            enabled: self.enabled,
            frequency,
        })
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.page_size)
    }
}
