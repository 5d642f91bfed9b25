// SPDX-License-Identifier: MIT

//! OAuth token pair stored per installation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// amoCRM OAuth access/refresh token pair.
///
/// A single record per installation (one CRM account). Replaced in place on
/// every refresh; removed only by re-authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// When the access token expires (already includes the 60s safety margin
    /// subtracted at refresh time).
    pub expires_at: DateTime<Utc>,
}
