// SPDX-FileCopyrightText: 2026 Portage Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bundle-level resolution: pool, aggregation, and retry gating.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use portage_cache::BlobCache;
use portage_client::AttachmentClient;
use portage_config::model::AttachmentConfig;
use portage_core::{
    Attachment, AttachmentFailure, BlobMeta, PendingBundle, PortageError, ResolvedAttachment,
};
use tracing::debug;

use crate::download::{DownloadOutcome, codes, download_attachment};

/// Aggregate outcome of one resolution pass over a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleStatus {
    /// Every attachment resolved to bytes.
    Ok,
    /// At least one transient failure; the bundle stays pending.
    Retry,
    /// Failures with nothing transient left; the bundle is abandoned.
    Error,
}

/// Result of [`Resolver::resolve_bundle`].
#[derive(Debug)]
pub struct BundleResolution {
    pub status: BundleStatus,
    /// Resolved bytes, populated only when `status` is `Ok`.
    pub attachments: Vec<ResolvedAttachment>,
    pub errors: Vec<AttachmentFailure>,
    /// Updated failed-attempt counters to write back onto the bundle.
    pub attempts: HashMap<String, u32>,
}

/// Resolves pending bundles against the blob cache and the network.
pub struct Resolver {
    client: AttachmentClient,
    cache: Arc<BlobCache>,
    policy: AttachmentConfig,
}

impl Resolver {
    pub fn new(client: AttachmentClient, cache: Arc<BlobCache>, policy: AttachmentConfig) -> Self {
        Self {
            client,
            cache,
            policy,
        }
    }

    pub fn cache(&self) -> &BlobCache {
        &self.cache
    }

    /// Minimum inter-attempt delay gate, enforced per bundle.
    pub fn should_attempt(&self, bundle: &PendingBundle, now: i64) -> bool {
        bundle.last_attempt_at <= 0 || now - bundle.last_attempt_at >= self.policy.retry_delay_ms
    }

    /// Resolve every descriptor in the bundle, at most `concurrency` fetches
    /// in flight, siblings of a failing attachment unaffected.
    pub async fn resolve_bundle(
        &self,
        bundle: &PendingBundle,
        timeout: Duration,
    ) -> BundleResolution {
        let mut attempts = bundle.attempts.clone();

        if bundle.attachments.is_empty() {
            return BundleResolution {
                status: BundleStatus::Error,
                attachments: vec![],
                errors: vec![AttachmentFailure {
                    att_id: None,
                    message: "no attachments provided".to_string(),
                    code: codes::NO_ATTACHMENTS.to_string(),
                    retryable: false,
                }],
                attempts,
            };
        }

        let jobs: Vec<(&Attachment, u32)> = bundle
            .attachments
            .iter()
            .map(|att| (att, attempts.get(&att.att_id).copied().unwrap_or(0)))
            .collect();

        let outcomes: Vec<(&Attachment, DownloadOutcome)> =
            futures::stream::iter(jobs.into_iter().map(|(att, prior)| {
                let message_id = bundle.id.as_str();
                async move {
                    let outcome = download_attachment(
                        &self.client,
                        &self.cache,
                        message_id,
                        att,
                        prior,
                        self.policy.retry_limit,
                        timeout,
                    )
                    .await;
                    (att, outcome)
                }
            }))
            .buffered(self.policy.concurrency.max(1))
            .collect()
            .await;

        let mut resolved = Vec::new();
        let mut errors = Vec::new();
        for (att, outcome) in outcomes {
            match outcome {
                DownloadOutcome::Ok { bytes, sha256 } => resolved.push(ResolvedAttachment {
                    att_id: att.att_id.clone(),
                    kind: att.kind,
                    filename: att.filename.clone(),
                    mime: att.mime.clone(),
                    size: att.size,
                    bytes,
                    sha256,
                }),
                DownloadOutcome::Failed { error, did_attempt } => {
                    if did_attempt {
                        *attempts.entry(att.att_id.clone()).or_insert(0) += 1;
                    }
                    errors.push(error);
                }
            }
        }

        let status = if errors.is_empty() {
            BundleStatus::Ok
        } else if errors.iter().any(|e| e.retryable) {
            BundleStatus::Retry
        } else {
            BundleStatus::Error
        };
        debug!(bundle = %bundle.id, ?status, errors = errors.len(), "bundle resolution pass done");

        BundleResolution {
            status,
            // Partial byte sets are never shipped; siblings stay cached for
            // the next pass instead.
            attachments: if status == BundleStatus::Ok {
                resolved
            } else {
                vec![]
            },
            errors,
            attempts,
        }
    }

    /// One-shot fetch for late attachment previews, bypassing the bundle
    /// retry budget but honoring cache and expiry gates.
    pub async fn fetch_for_preview(
        &self,
        message_id: &str,
        attachment: &Attachment,
        timeout: Duration,
    ) -> Result<(Vec<u8>, Option<String>, BlobMeta), PortageError> {
        match download_attachment(
            &self.client,
            &self.cache,
            message_id,
            attachment,
            0,
            self.policy.retry_limit,
            timeout,
        )
        .await
        {
            DownloadOutcome::Ok { bytes, sha256 } => {
                Ok((bytes, sha256, BlobMeta::from_attachment(attachment)))
            }
            DownloadOutcome::Failed { error, .. } => Err(PortageError::Attachment {
                code: error.code,
                message: error.message,
                retryable: error.retryable,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portage_config::model::CacheConfig;
    use portage_core::clock::now_ms;
    use portage_core::{AttachmentKind, FetchSpec, MessageKind};
    use tempfile::tempdir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn resolver(dir: &tempfile::TempDir) -> Resolver {
        let cache = BlobCache::open(&dir.path().join("blobs.db"), &CacheConfig::default())
            .await
            .unwrap();
        Resolver::new(
            AttachmentClient::new().unwrap(),
            Arc::new(cache),
            AttachmentConfig::default(),
        )
    }

    fn attachment(att_id: &str, url: String) -> Attachment {
        Attachment {
            att_id: att_id.into(),
            kind: AttachmentKind::File,
            filename: format!("{att_id}.bin"),
            mime: String::new(),
            size: None,
            fetch: FetchSpec {
                url,
                method: "GET".into(),
                headers: Default::default(),
                expires_at: None,
            },
        }
    }

    fn bundle(id: &str, attachments: Vec<Attachment>) -> PendingBundle {
        PendingBundle {
            id: id.into(),
            ts: 1,
            text: "bundle".into(),
            kind: MessageKind::Bundle,
            attachments,
            attempts: HashMap::new(),
            errors: vec![],
            created_at: 1,
            last_attempt_at: 0,
        }
    }

    fn carry_attempts(bundle: &mut PendingBundle, resolution: &BundleResolution) {
        bundle.attempts = resolution.attempts.clone();
    }

    #[tokio::test]
    async fn all_attachments_ok_resolves_with_hashes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"def".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let bundle = bundle(
            "m1",
            vec![
                attachment("a1", format!("{}/a1", server.uri())),
                attachment("a2", format!("{}/a2", server.uri())),
            ],
        );

        let resolution = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(resolution.status, BundleStatus::Ok);
        assert_eq!(resolution.attachments.len(), 2);
        assert!(resolution.errors.is_empty());
        assert_eq!(
            resolution.attachments[0].sha256.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        // Successful fetches never consume retry budget.
        assert_eq!(resolution.attempts.get("a1"), None);
    }

    #[tokio::test]
    async fn transient_429_then_success_uses_one_budget_unit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a1"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"late".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let mut bundle = bundle("m1", vec![attachment("a1", format!("{}/a1", server.uri()))]);

        let first = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(first.status, BundleStatus::Retry);
        assert_eq!(first.errors[0].code, "HTTP_429");
        assert!(first.errors[0].retryable);
        assert_eq!(first.attempts.get("a1"), Some(&1));

        carry_attempts(&mut bundle, &first);
        let second = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(second.status, BundleStatus::Ok);
        assert_eq!(second.attachments[0].bytes, b"late".to_vec());
        // The successful second fetch added nothing to the counter.
        assert_eq!(second.attempts.get("a1"), Some(&1));
    }

    #[tokio::test]
    async fn persistent_500_exhausts_budget_exactly_at_limit() {
        let server = MockServer::start().await;
        // The retry limit is 2, so exactly two requests may reach the server.
        Mock::given(method("GET"))
            .and(path("/a1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let mut bundle = bundle("m1", vec![attachment("a1", format!("{}/a1", server.uri()))]);

        let first = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(first.status, BundleStatus::Retry);
        carry_attempts(&mut bundle, &first);

        let second = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(second.status, BundleStatus::Retry);
        assert_eq!(second.attempts.get("a1"), Some(&2));
        carry_attempts(&mut bundle, &second);

        // Third pass fast-fails without a network call.
        let third = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(third.status, BundleStatus::Error);
        assert_eq!(third.errors[0].code, codes::RETRY_EXHAUSTED);
        assert!(!third.errors[0].retryable);
        assert_eq!(third.attempts.get("a1"), Some(&2));
    }

    #[tokio::test]
    async fn expired_descriptor_fails_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let mut att = attachment("a1", format!("{}/a1", server.uri()));
        att.fetch.expires_at = Some(now_ms() - 10_000);
        let bundle = bundle("m1", vec![att]);

        let resolution = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(resolution.status, BundleStatus::Error);
        assert_eq!(resolution.errors[0].code, codes::EXPIRED);
        assert!(!resolution.errors[0].retryable);
        assert!(resolution.attempts.is_empty(), "no budget consumed");
    }

    #[tokio::test]
    async fn auth_failure_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let bundle = bundle("m1", vec![attachment("a1", format!("{}/a1", server.uri()))]);

        let resolution = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(resolution.status, BundleStatus::Error);
        assert_eq!(resolution.errors[0].code, "HTTP_403");
        assert!(!resolution.errors[0].retryable);
    }

    #[tokio::test]
    async fn second_resolution_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"cached".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let bundle = bundle("m1", vec![attachment("a1", format!("{}/a1", server.uri()))]);

        let first = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        let second = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(first.status, BundleStatus::Ok);
        assert_eq!(second.status, BundleStatus::Ok);
        assert_eq!(
            first.attachments[0].bytes,
            second.attachments[0].bytes,
            "cache must hand back identical bytes"
        );
        assert_eq!(first.attachments[0].sha256, second.attachments[0].sha256);
    }

    #[tokio::test]
    async fn failing_sibling_does_not_refetch_resolved_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/good"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"now".to_vec()))
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let mut bundle = bundle(
            "m1",
            vec![
                attachment("good", format!("{}/good", server.uri())),
                attachment("flaky", format!("{}/flaky", server.uri())),
            ],
        );

        let first = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(first.status, BundleStatus::Retry);
        assert!(first.attachments.is_empty(), "partial sets are not shipped");
        carry_attempts(&mut bundle, &first);

        // Second pass: the good sibling comes from cache (expect(1) above),
        // only the flaky one goes back to the network.
        let second = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(second.status, BundleStatus::Ok);
        assert_eq!(second.attachments.len(), 2);
    }

    #[tokio::test]
    async fn empty_bundle_is_a_terminal_error() {
        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let bundle = bundle("m1", vec![]);
        let resolution = resolver.resolve_bundle(&bundle, TIMEOUT).await;
        assert_eq!(resolution.status, BundleStatus::Error);
        assert_eq!(resolution.errors[0].code, codes::NO_ATTACHMENTS);
    }

    #[tokio::test]
    async fn should_attempt_respects_retry_delay() {
        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let mut bundle = bundle("m1", vec![]);

        assert!(resolver.should_attempt(&bundle, now_ms()), "fresh bundle");

        let now = now_ms();
        bundle.last_attempt_at = now - 100;
        assert!(!resolver.should_attempt(&bundle, now), "inside the delay");

        bundle.last_attempt_at = now - 2000;
        assert!(resolver.should_attempt(&bundle, now), "delay elapsed");
    }

    #[tokio::test]
    async fn preview_fetch_returns_meta_and_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/p"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pv".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempdir().unwrap();
        let resolver = resolver(&dir).await;
        let att = attachment("a1", format!("{}/p", server.uri()));

        let (bytes, sha256, meta) = resolver.fetch_for_preview("m9", &att, TIMEOUT).await.unwrap();
        assert_eq!(bytes, b"pv".to_vec());
        assert!(sha256.is_some());
        assert_eq!(meta.att_id, "a1");

        // Cached now: a second preview makes no further request.
        let (bytes2, _, _) = resolver.fetch_for_preview("m9", &att, TIMEOUT).await.unwrap();
        assert_eq!(bytes2, bytes);
    }
}
