//! Package, channel and version listings over a [`ParsedCatalog`].

use serde::Serialize;

use crate::model::{ChannelEntry, ParsedCatalog};
use crate::{Error, Result};

/// A package and its default channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    /// Package name.
    pub name: String,
    /// Channel used when none is requested.
    pub default_channel: String,
}

/// A channel and its head entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelHead {
    /// Channel name.
    pub name: String,
    /// Name of the last entry in declaration order, empty for a channel without entries.
    pub head: String,
}

/// Every package in the catalog, in load order.
#[must_use]
pub fn list_packages(catalog: &ParsedCatalog) -> Vec<PackageSummary> {
    catalog
        .packages
        .iter()
        .map(|p| PackageSummary {
            name: p.name.clone(),
            default_channel: p.default_channel.clone(),
        })
        .collect()
}

/// Channels belonging to `package`.
///
/// The head is positional: the last entry as declared, not the tip of
/// the upgrade graph.
pub fn list_channels(catalog: &ParsedCatalog, package: &str) -> Result<Vec<ChannelHead>> {
    let channels: Vec<ChannelHead> = catalog
        .channels
        .iter()
        .filter(|c| c.package == package)
        .map(|c| ChannelHead {
            name: c.name.clone(),
            head: c.entries.last().map(|e| e.name.clone()).unwrap_or_default(),
        })
        .collect();

    if channels.is_empty() {
        return Err(Error::PackageNotFound(package.to_string()));
    }
    Ok(channels)
}

/// Entries of the channel named `channel` in `package`.
pub fn list_versions(
    catalog: &ParsedCatalog,
    package: &str,
    channel: &str,
) -> Result<Vec<ChannelEntry>> {
    catalog
        .channels
        .iter()
        .find(|c| c.package == package && c.name == channel)
        .map(|c| c.entries.clone())
        .ok_or_else(|| Error::channel_not_found(package, channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Channel, Package};

    fn catalog() -> ParsedCatalog {
        ParsedCatalog {
            packages: vec![
                Package {
                    name: "pkg1".to_string(),
                    default_channel: "stable".to_string(),
                    description: None,
                },
                Package {
                    name: "pkg2".to_string(),
                    default_channel: "beta".to_string(),
                    description: None,
                },
            ],
            channels: vec![
                Channel {
                    name: "stable".to_string(),
                    package: "pkg1".to_string(),
                    entries: vec![ChannelEntry::named("v1.0.0"), ChannelEntry::named("v1.1.0")],
                },
                Channel {
                    name: "beta".to_string(),
                    package: "pkg2".to_string(),
                    entries: vec![ChannelEntry::named("v2.0.0")],
                },
            ],
            bundles: Vec::new(),
        }
    }

    #[test]
    fn test_list_packages() {
        let packages = list_packages(&catalog());
        assert_eq!(
            packages,
            vec![
                PackageSummary {
                    name: "pkg1".to_string(),
                    default_channel: "stable".to_string(),
                },
                PackageSummary {
                    name: "pkg2".to_string(),
                    default_channel: "beta".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_list_channels_reports_last_entry_as_head() {
        let channels = list_channels(&catalog(), "pkg1").unwrap();
        assert_eq!(
            channels,
            vec![ChannelHead {
                name: "stable".to_string(),
                head: "v1.1.0".to_string(),
            }]
        );
    }

    #[test]
    fn test_list_channels_unknown_package() {
        let mut catalog = catalog();
        catalog.channels.retain(|c| c.package != "pkg1");

        let err = list_channels(&catalog, "pkg1").unwrap_err();
        assert_eq!(err.to_string(), r#"package "pkg1" not found in catalog"#);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_empty_channel_has_empty_head() {
        let mut catalog = catalog();
        catalog.channels[1].entries.clear();

        let channels = list_channels(&catalog, "pkg2").unwrap();
        assert_eq!(channels[0].head, "");
    }

    #[test]
    fn test_list_versions() {
        let versions = list_versions(&catalog(), "pkg1", "stable").unwrap();
        let names: Vec<&str> = versions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["v1.0.0", "v1.1.0"]);
    }

    #[test]
    fn test_list_versions_requires_exact_match() {
        // "beta" exists, but not for pkg1.
        let err = list_versions(&catalog(), "pkg1", "beta").unwrap_err();
        assert_eq!(err.to_string(), r#"channel "beta" for package "pkg1" not found"#);
        assert!(err.is_not_found());
    }
}
