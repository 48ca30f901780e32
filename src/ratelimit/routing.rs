//! Endpoint to category routing.

/// Pick the category for an API endpoint.
///
/// First match wins, checked in this order:
///
/// | endpoint contains           | category    |
/// |-----------------------------|-------------|
/// | `/auth/`                    | `auth`      |
/// | `/ics/export`               | `export`    |
/// | `/ics/import` or `/ics/`    | `import`    |
/// | `/dashboard`                | `dashboard` |
/// | anything else               | `api`       |
pub fn category_for_endpoint(endpoint: &str) -> &'static str {
    if endpoint.contains("/auth/") {
        "auth"
    } else if endpoint.contains("/ics/export") {
        "export"
    } else if endpoint.contains("/ics/import") || endpoint.contains("/ics/") {
        "import"
    } else if endpoint.contains("/dashboard") {
        "dashboard"
    } else {
        "api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_for_endpoint() {
        assert_eq!(category_for_endpoint("/auth/login"), "auth");
        assert_eq!(category_for_endpoint("https://x.supabase.co/auth/v1/token"), "auth");
        assert_eq!(category_for_endpoint("/ics/export/x"), "export");
        assert_eq!(category_for_endpoint("/ics/import"), "import");
        assert_eq!(category_for_endpoint("/ics/feed.ics"), "import");
        assert_eq!(category_for_endpoint("/dashboard/stats"), "dashboard");
        assert_eq!(category_for_endpoint("/other"), "api");
        assert_eq!(category_for_endpoint(""), "api");
    }

    #[test]
    fn test_category_priority() {
        // Earlier rules shadow later ones
        assert_eq!(category_for_endpoint("/auth/ics/export"), "auth");
        assert_eq!(category_for_endpoint("/dashboard/ics/export"), "export");
        // No trailing slash means no auth match
        assert_eq!(category_for_endpoint("/auth"), "api");
    }
}
