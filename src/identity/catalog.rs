//! Static identity catalog.
//!
//! Maps TLS client signatures to the browser family, platform class and OS
//! family a matching user-agent has to advertise. The signatures follow the
//! naming used by common TLS impersonation stacks (`chrome_120`,
//! `safari_ios_16_0`, `okhttp4_android_13`, ...).

use once_cell::sync::Lazy;

/// Browser family advertised by a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    Chrome,
    ChromeMobile,
    Firefox,
    Opera,
    Safari,
    MobileSafari,
}

impl BrowserFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::ChromeMobile => "Chrome Mobile",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Opera => "Opera",
            BrowserFamily::Safari => "Safari",
            BrowserFamily::MobileSafari => "Mobile Safari",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformClass {
    Desktop,
    Mobile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
    Ios,
    Android,
}

impl OsFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            OsFamily::Windows => "Windows",
            OsFamily::MacOs => "Mac OS X",
            OsFamily::Linux => "Linux",
            OsFamily::Ios => "iOS",
            OsFamily::Android => "Android",
        }
    }
}

/// One signature together with the constraints its user-agent must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub signature: String,
    pub browser: BrowserFamily,
    pub platform: PlatformClass,
    pub os: OsFamily,
}

impl CatalogEntry {
    pub fn new(
        signature: impl Into<String>,
        browser: BrowserFamily,
        platform: PlatformClass,
        os: OsFamily,
    ) -> Self {
        Self {
            signature: signature.into(),
            browser,
            platform,
            os,
        }
    }
}

static DEFAULT_CATALOG: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    let mut entries = Vec::new();

    for version in 103..=120 {
        entries.push(CatalogEntry::new(
            format!("chrome_{version}"),
            BrowserFamily::Chrome,
            PlatformClass::Desktop,
            OsFamily::Windows,
        ));
    }

    for signature in ["safari_15_6_1", "safari_16_0"] {
        entries.push(CatalogEntry::new(
            signature,
            BrowserFamily::Safari,
            PlatformClass::Desktop,
            OsFamily::MacOs,
        ));
    }

    for signature in ["safari_ios_15_5", "safari_ios_15_6", "safari_ios_16_0"] {
        entries.push(CatalogEntry::new(
            signature,
            BrowserFamily::MobileSafari,
            PlatformClass::Mobile,
            OsFamily::Ios,
        ));
    }

    for version in [102, 104, 105, 106, 108, 110, 117, 120] {
        entries.push(CatalogEntry::new(
            format!("firefox_{version}"),
            BrowserFamily::Firefox,
            PlatformClass::Desktop,
            OsFamily::Linux,
        ));
    }

    for version in 89..=91 {
        entries.push(CatalogEntry::new(
            format!("opera_{version}"),
            BrowserFamily::Opera,
            PlatformClass::Desktop,
            OsFamily::Windows,
        ));
    }

    for version in 7..=13 {
        entries.push(CatalogEntry::new(
            format!("okhttp4_android_{version}"),
            BrowserFamily::ChromeMobile,
            PlatformClass::Mobile,
            OsFamily::Android,
        ));
    }

    entries
});

/// The built-in catalog shipped with the crate.
pub fn default_catalog() -> Vec<CatalogEntry> {
    DEFAULT_CATALOG.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_unique() {
        let catalog = default_catalog();
        let mut signatures: Vec<_> = catalog.iter().map(|e| e.signature.as_str()).collect();
        signatures.sort_unstable();
        signatures.dedup();
        assert_eq!(signatures.len(), catalog.len());
    }

    #[test]
    fn mobile_entries_use_mobile_os() {
        for entry in default_catalog() {
            if entry.platform == PlatformClass::Mobile {
                assert!(matches!(entry.os, OsFamily::Ios | OsFamily::Android));
            }
        }
    }
}
