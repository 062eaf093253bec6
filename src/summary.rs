use crate::results::TrackedPage;
use serde::{Deserialize, Serialize};

/// Payload handed to the summarization service for a page's latest change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub website_name: String,
    pub website_url: String,

    /// The rendered diff, one `- ` or `+ ` line per block
    pub differences: String,
}

impl SummaryRequest {
    /// Build the request for a page, or `None` if no change has been recorded
    pub fn for_page(page: &TrackedPage) -> Option<Self> {
        if page.last_diff.is_empty() {
            return None;
        }

        Some(Self {
            website_name: page.display_name.clone(),
            website_url: page.url.clone(),
            differences: page.rendered_diff(),
        })
    }
}
