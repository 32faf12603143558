//! Endpoint addresses for TCP probes

use crate::error::{CliError, Result};

/// Resolve every resource to a connectable `host:port` address
pub fn endpoints(resources: &[String], default_port: Option<u16>) -> Result<Vec<String>> {
    resources
        .iter()
        .map(|resource| endpoint(resource, default_port))
        .collect()
}

fn endpoint(resource: &str, default_port: Option<u16>) -> Result<String> {
    let resource = resource.trim();
    if has_port(resource) {
        return Ok(resource.to_string());
    }

    let port = default_port.ok_or_else(|| CliError::missing_port(resource))?;
    // Bare IPv6 literal
    if resource.contains(':') && !resource.starts_with('[') {
        Ok(format!("[{resource}]:{port}"))
    } else {
        Ok(format!("{resource}:{port}"))
    }
}

fn has_port(resource: &str) -> bool {
    if let Some(rest) = resource.strip_prefix('[') {
        return rest
            .split_once("]:")
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    }
    match resource.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => port.parse::<u16>().is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_keeps_explicit_ports() {
        let resolved = endpoints(&strings(&["10.0.0.1:53", "[::1]:8080", "db.local:5432"]), None)
            .unwrap();
        assert_eq!(resolved, strings(&["10.0.0.1:53", "[::1]:8080", "db.local:5432"]));
    }

    #[test]
    fn test_applies_default_port() {
        let resolved = endpoints(&strings(&["10.0.0.1", "::1", "[fe80::1]"]), Some(53)).unwrap();
        assert_eq!(resolved, strings(&["10.0.0.1:53", "[::1]:53", "[fe80::1]:53"]));
    }

    #[test]
    fn test_missing_port_is_error() {
        let err = endpoints(&strings(&["10.0.0.1:53", "backup"]), None).unwrap_err();
        assert!(matches!(err, CliError::MissingPort { ref resource } if resource == "backup"));
    }
}
