//! Client identity selection.
//!
//! Responsibilities:
//! - Hold the fixed catalog of client signatures.
//! - Generate a user-agent that matches the browser/platform/OS a signature
//!   advertises.
//! - Hand out random identity profiles to the rotator.

pub mod catalog;
pub mod rotator;

use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;
use std::sync::Arc;

pub use catalog::{BrowserFamily, CatalogEntry, OsFamily, PlatformClass, default_catalog};
pub use rotator::{ActiveIdentity, IdentityRotator, SiteHeaders};

/// Signature plus the user-agent generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub signature: String,
    pub user_agent: String,
}

/// Produces user-agent strings constrained by a catalog entry.
pub trait UserAgentGenerator: Send + Sync {
    fn generate(&self, entry: &CatalogEntry) -> Result<String, IdentityError>;
}

type TemplateKey = (BrowserFamily, PlatformClass, OsFamily);

/// `{v}` is replaced with a major version drawn from the template's range.
struct UserAgentTemplate {
    pattern: &'static str,
    versions: (u32, u32),
}

static TEMPLATES: Lazy<HashMap<TemplateKey, Vec<UserAgentTemplate>>> = Lazy::new(|| {
    use BrowserFamily::*;
    use OsFamily::*;
    use PlatformClass::*;

    let mut map: HashMap<TemplateKey, Vec<UserAgentTemplate>> = HashMap::new();
    map.insert(
        (Chrome, Desktop, Windows),
        vec![
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
                versions: (103, 131),
            },
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Safari/537.36",
                versions: (103, 124),
            },
        ],
    );
    map.insert(
        (Safari, Desktop, MacOs),
        vec![
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{v}.6 Safari/605.1.15",
                versions: (15, 17),
            },
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{v}.0 Safari/605.1.15",
                versions: (15, 18),
            },
        ],
    );
    map.insert(
        (MobileSafari, Mobile, Ios),
        vec![
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (iPhone; CPU iPhone OS {v}_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{v}.5 Mobile/15E148 Safari/604.1",
                versions: (15, 17),
            },
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (iPad; CPU OS {v}_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/{v}.0 Mobile/15E148 Safari/604.1",
                versions: (15, 17),
            },
        ],
    );
    map.insert(
        (Firefox, Desktop, Linux),
        vec![
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (X11; Linux x86_64; rv:{v}.0) Gecko/20100101 Firefox/{v}.0",
                versions: (102, 128),
            },
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:{v}.0) Gecko/20100101 Firefox/{v}.0",
                versions: (102, 128),
            },
        ],
    );
    map.insert(
        (Opera, Desktop, Windows),
        vec![UserAgentTemplate {
            pattern: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36 OPR/{v}.0.0.0",
            versions: (89, 104),
        }],
    );
    map.insert(
        (ChromeMobile, Mobile, Android),
        vec![
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Mobile Safari/537.36",
                versions: (103, 131),
            },
            UserAgentTemplate {
                pattern: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{v}.0.0.0 Mobile Safari/537.36",
                versions: (110, 131),
            },
        ],
    );
    map
});

/// Built-in generator backed by a table of realistic user-agent templates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateUserAgentGenerator;

impl UserAgentGenerator for TemplateUserAgentGenerator {
    fn generate(&self, entry: &CatalogEntry) -> Result<String, IdentityError> {
        let templates = TEMPLATES
            .get(&(entry.browser, entry.platform, entry.os))
            .filter(|templates| !templates.is_empty())
            .ok_or_else(|| IdentityError::Unsupported {
                signature: entry.signature.clone(),
                browser: entry.browser.as_str(),
                os: entry.os.as_str(),
            })?;

        let mut rng = thread_rng();
        let template = templates
            .choose(&mut rng)
            .ok_or(IdentityError::EmptyCatalog)?;
        let (min, max) = template.versions;
        let version = rng.gen_range(min..=max.max(min));
        Ok(template.pattern.replace("{v}", &version.to_string()))
    }
}

/// Hands out random identity profiles from a fixed catalog.
pub struct IdentityProvider {
    catalog: Vec<CatalogEntry>,
    generator: Arc<dyn UserAgentGenerator>,
}

impl IdentityProvider {
    pub fn new(catalog: Vec<CatalogEntry>, generator: Arc<dyn UserAgentGenerator>) -> Self {
        Self { catalog, generator }
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    /// Checks that every catalog entry can produce a user-agent.
    pub fn validate(&self) -> Result<(), IdentityError> {
        if self.catalog.is_empty() {
            return Err(IdentityError::EmptyCatalog);
        }
        for entry in &self.catalog {
            self.generator.generate(entry)?;
        }
        log::debug!(
            "identity provider validated {} catalog entries",
            self.catalog.len()
        );
        Ok(())
    }

    pub fn pick_random(&self) -> Result<IdentityProfile, IdentityError> {
        let entry = self
            .catalog
            .choose(&mut thread_rng())
            .ok_or(IdentityError::EmptyCatalog)?;
        let user_agent = self.generator.generate(entry)?;
        log::debug!("selected identity {} -> {}", entry.signature, user_agent);
        Ok(IdentityProfile {
            signature: entry.signature.clone(),
            user_agent,
        })
    }
}

impl Default for IdentityProvider {
    fn default() -> Self {
        Self::new(default_catalog(), Arc::new(TemplateUserAgentGenerator))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity catalog is empty")]
    EmptyCatalog,
    #[error("no user-agent can be generated for '{signature}' ({browser} on {os})")]
    Unsupported {
        signature: String,
        browser: &'static str,
        os: &'static str,
    },
    #[error("identity header '{0}' is not a valid header value")]
    InvalidHeader(String),
}
