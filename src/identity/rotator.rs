//! Active identity holder.
//!
//! The rotator owns the identity currently presented to the quotation API and
//! the request headers derived from it. Rotation builds a complete new
//! [`ActiveIdentity`] and swaps the shared pointer, so concurrent readers get
//! either the old or the new identity, never a mix of both.

use std::sync::{Arc, PoisonError, RwLock};

use http::header::{ACCEPT, ACCEPT_LANGUAGE, DNT, HOST, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};

use super::{IdentityError, IdentityProfile, IdentityProvider};
use crate::modules::events::{EventDispatcher, FetchEvent, RotationEvent, RotationReason};

const PRIORITY: HeaderName = HeaderName::from_static("priority");

/// Site-specific header values that do not change with the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteHeaders {
    pub host: String,
    pub referer: String,
    pub accept: String,
    pub accept_language: String,
}

impl SiteHeaders {
    pub fn new(host: impl Into<String>, referer: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            referer: referer.into(),
            accept: "application/json".into(),
            accept_language: "en-US,en;q=0.9".into(),
        }
    }
}

/// Profile and the headers derived from it. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct ActiveIdentity {
    pub profile: IdentityProfile,
    pub headers: HeaderMap,
}

/// Shares the active identity between concurrently executing requests.
pub struct IdentityRotator {
    provider: IdentityProvider,
    site: SiteHeaders,
    active: RwLock<Arc<ActiveIdentity>>,
    events: Arc<EventDispatcher>,
}

impl IdentityRotator {
    /// Picks the initial identity right away so the first request already has
    /// a full header set.
    pub fn new(
        provider: IdentityProvider,
        site: SiteHeaders,
        events: Arc<EventDispatcher>,
    ) -> Result<Self, IdentityError> {
        let initial = build_identity(&provider, &site)?;
        events.dispatch(FetchEvent::Rotation(RotationEvent::new(
            &initial.profile,
            RotationReason::Initial,
        )));
        Ok(Self {
            provider,
            site,
            active: RwLock::new(Arc::new(initial)),
            events,
        })
    }

    pub fn current(&self) -> Arc<ActiveIdentity> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_headers(&self) -> HeaderMap {
        self.current().headers.clone()
    }

    /// Replaces the active identity with a freshly picked one.
    pub fn rotate(&self, reason: RotationReason) -> Result<Arc<ActiveIdentity>, IdentityError> {
        let next = Arc::new(build_identity(&self.provider, &self.site)?);
        {
            let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
            *guard = next.clone();
        }
        self.events.dispatch(FetchEvent::Rotation(RotationEvent::new(
            &next.profile,
            reason,
        )));
        Ok(next)
    }
}

fn build_identity(
    provider: &IdentityProvider,
    site: &SiteHeaders,
) -> Result<ActiveIdentity, IdentityError> {
    let profile = provider.pick_random()?;
    let headers = build_headers(site, &profile.user_agent)?;
    Ok(ActiveIdentity { profile, headers })
}

fn build_headers(site: &SiteHeaders, user_agent: &str) -> Result<HeaderMap, IdentityError> {
    let mut headers = HeaderMap::new();
    headers.insert(HOST, header_value("host", &site.host)?);
    headers.insert(ACCEPT, header_value("accept", &site.accept)?);
    headers.insert(
        ACCEPT_LANGUAGE,
        header_value("accept-language", &site.accept_language)?,
    );
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(PRIORITY, HeaderValue::from_static("u=1, i"));
    headers.insert(REFERER, header_value("referer", &site.referer)?);
    headers.insert(USER_AGENT, header_value("user-agent", user_agent)?);
    Ok(headers)
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, IdentityError> {
    HeaderValue::from_str(value).map_err(|_| IdentityError::InvalidHeader(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{
        BrowserFamily, CatalogEntry, OsFamily, PlatformClass, TemplateUserAgentGenerator,
        UserAgentGenerator,
    };
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl UserAgentGenerator for Counting {
        fn generate(&self, entry: &CatalogEntry) -> Result<String, IdentityError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            TemplateUserAgentGenerator.generate(entry)
        }
    }

    fn site() -> SiteHeaders {
        SiteHeaders::new("gmgn.ai", "https://gmgn.ai/?chain=sol")
    }

    fn entries(count: usize) -> Vec<CatalogEntry> {
        (0..count)
            .map(|idx| {
                CatalogEntry::new(
                    format!("chrome_{}", 100 + idx),
                    BrowserFamily::Chrome,
                    PlatformClass::Desktop,
                    OsFamily::Windows,
                )
            })
            .collect()
    }

    #[test]
    fn headers_carry_site_and_agent() {
        let rotator = IdentityRotator::new(
            IdentityProvider::default(),
            site(),
            Arc::new(EventDispatcher::new()),
        )
        .unwrap();
        let identity = rotator.current();
        let headers = &identity.headers;
        assert_eq!(headers.get(HOST).unwrap(), "gmgn.ai");
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
        assert_eq!(headers.get(DNT).unwrap(), "1");
        assert_eq!(headers.get(REFERER).unwrap(), "https://gmgn.ai/?chain=sol");
        assert_eq!(
            headers.get(USER_AGENT).unwrap().to_str().unwrap(),
            identity.profile.user_agent
        );
    }

    #[test]
    fn rotate_invokes_provider_once_per_call() {
        let counting = Arc::new(Counting(AtomicUsize::new(0)));
        let provider = IdentityProvider::new(entries(1), counting.clone());
        let rotator =
            IdentityRotator::new(provider, site(), Arc::new(EventDispatcher::new())).unwrap();
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);

        for _ in 0..3 {
            rotator.rotate(RotationReason::Threshold).unwrap();
        }
        assert_eq!(counting.0.load(Ordering::SeqCst), 4);
    }

    /// Hands out a distinct agent per call and remembers every one of them.
    #[derive(Default)]
    struct Recording {
        issued: Mutex<HashSet<String>>,
        next: AtomicUsize,
    }

    impl UserAgentGenerator for Recording {
        fn generate(&self, entry: &CatalogEntry) -> Result<String, IdentityError> {
            let agent = format!(
                "agent-{}-{}",
                self.next.fetch_add(1, Ordering::SeqCst),
                entry.signature
            );
            self.issued.lock().unwrap().insert(agent.clone());
            Ok(agent)
        }
    }

    #[test]
    fn concurrent_header_reads_see_whole_identities() {
        let recording = Arc::new(Recording::default());
        let provider = IdentityProvider::new(entries(16), recording.clone());
        let rotator = Arc::new(
            IdentityRotator::new(provider, site(), Arc::new(EventDispatcher::new())).unwrap(),
        );

        let writer = {
            let rotator = rotator.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    rotator.rotate(RotationReason::Threshold).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let rotator = rotator.clone();
                std::thread::spawn(move || {
                    let mut seen = Vec::with_capacity(500);
                    for _ in 0..500 {
                        let headers = rotator.current_headers();
                        assert_eq!(headers.len(), 7);
                        assert_eq!(headers.get(HOST).unwrap(), "gmgn.ai");
                        assert_eq!(headers.get(REFERER).unwrap(), "https://gmgn.ai/?chain=sol");
                        seen.push(headers.get(USER_AGENT).unwrap().to_str().unwrap().to_string());
                    }
                    seen
                })
            })
            .collect();

        writer.join().unwrap();
        let issued = recording.issued.lock().unwrap().clone();
        assert_eq!(issued.len(), 501);
        for reader in readers {
            for agent in reader.join().unwrap() {
                assert!(issued.contains(&agent), "unknown agent {agent}");
            }
        }
        let last = rotator.current();
        assert_eq!(
            rotator.current_headers().get(USER_AGENT).unwrap(),
            last.profile.user_agent.as_str()
        );
    }

    #[test]
    fn invalid_agent_is_a_configuration_error() {
        struct Broken;
        impl UserAgentGenerator for Broken {
            fn generate(&self, _entry: &CatalogEntry) -> Result<String, IdentityError> {
                Ok("bad\nagent".into())
            }
        }
        let provider = IdentityProvider::new(entries(1), Arc::new(Broken));
        let result = IdentityRotator::new(provider, site(), Arc::new(EventDispatcher::new()));
        assert!(matches!(result, Err(IdentityError::InvalidHeader(_))));
    }
}
