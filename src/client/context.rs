//! Per-request client context
//!
//! Built once from the request headers and query string, then passed by
//! reference through the pipeline. Nothing here is persisted.

use serde::Serialize;

use super::{classify, ApiVersion, ClientType};
use crate::types::{GatewayError, Result};

/// Who is asking, and in which API dialect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientContext {
    /// Raw `X-Client-ID` value (may be empty)
    pub client_id: String,
    /// Type derived from `client_id`
    pub client_type: ClientType,
    /// Version negotiated through `Accept`
    pub api_version: ApiVersion,
    /// Explicit `fields` selection, when the request carried one
    pub requested_fields: Option<Vec<String>>,
}

impl ClientContext {
    /// Context for a client id at a given version, without field selection
    pub fn new(client_id: impl Into<String>, api_version: ApiVersion) -> Self {
        let client_id = client_id.into();
        let client_type = classify(&client_id);
        Self {
            client_id,
            client_type,
            api_version,
            requested_fields: None,
        }
    }

    /// Attach a comma-separated `fields` selection
    pub fn with_fields(mut self, raw: &str) -> Self {
        self.requested_fields = Some(parse_field_list(raw));
        self
    }

    /// Build a context from the raw header and query values of a request
    pub fn from_parts(
        client_id: Option<&str>,
        accept: Option<&str>,
        fields: Option<&str>,
    ) -> Result<Self> {
        let version = version_from_accept(accept)?;
        let context = Self::new(client_id.unwrap_or(""), version);

        Ok(match fields {
            Some(raw) => context.with_fields(raw),
            None => context,
        })
    }
}

/// Split a `fields=a,b,c` value into names, dropping blanks
pub fn parse_field_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the `version` media-type parameter from an `Accept` header.
///
/// `application/json; version=v2` selects v2. A missing header or a media
/// range without the parameter selects v1. A version outside v1..v3 is
/// rejected rather than silently downgraded.
pub fn version_from_accept(accept: Option<&str>) -> Result<ApiVersion> {
    let Some(accept) = accept else {
        return Ok(ApiVersion::default());
    };

    for media_range in accept.split(',') {
        for param in media_range.split(';').skip(1) {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("version") {
                continue;
            }

            let value = value.trim().trim_matches('"');
            return ApiVersion::parse(value).ok_or_else(|| {
                GatewayError::NotAcceptable("Invalid version in \"Accept\" header.".to_string())
            });
        }
    }

    Ok(ApiVersion::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_header_versions() {
        assert_eq!(version_from_accept(None).unwrap(), ApiVersion::V1);
        assert_eq!(
            version_from_accept(Some("application/json")).unwrap(),
            ApiVersion::V1
        );
        assert_eq!(
            version_from_accept(Some("application/json; version=v2")).unwrap(),
            ApiVersion::V2
        );
        assert_eq!(
            version_from_accept(Some("application/json;Version=\"v3\"")).unwrap(),
            ApiVersion::V3
        );
    }

    #[test]
    fn test_unknown_version_rejected() {
        let err = version_from_accept(Some("application/json; version=v9")).unwrap_err();
        assert!(matches!(err, GatewayError::NotAcceptable(_)));
    }

    #[test]
    fn test_version_in_second_media_range() {
        let accept = "text/html, application/json; q=0.9; version=v2";
        assert_eq!(version_from_accept(Some(accept)).unwrap(), ApiVersion::V2);
    }

    #[test]
    fn test_field_list_parsing() {
        assert_eq!(
            parse_field_list("id,email, first_name,,"),
            vec!["id", "email", "first_name"]
        );
        assert!(parse_field_list("").is_empty());
    }

    #[test]
    fn test_context_from_parts() {
        let ctx = ClientContext::from_parts(
            Some("mobile_app_1"),
            Some("application/json; version=v2"),
            Some("email,first_name"),
        )
        .unwrap();

        assert_eq!(ctx.client_type, ClientType::MobileApp);
        assert_eq!(ctx.api_version, ApiVersion::V2);
        assert_eq!(
            ctx.requested_fields,
            Some(vec!["email".to_string(), "first_name".to_string()])
        );
    }

    #[test]
    fn test_context_defaults() {
        let ctx = ClientContext::from_parts(None, None, None).unwrap();
        assert_eq!(ctx.client_id, "");
        assert_eq!(ctx.client_type, ClientType::ModernClinic);
        assert_eq!(ctx.api_version, ApiVersion::V1);
        assert!(ctx.requested_fields.is_none());
    }
}
