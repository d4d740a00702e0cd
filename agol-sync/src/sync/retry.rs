//! Classification des réponses du service et politique de reprise
//!
//! Le service signale ses échecs de manière ambiguë: résultat absent, code
//! 1003 par ligne, ou simple message d'erreur. Les règles sur les messages
//! forment une table ordonnée (motif → raison), la première qui correspond
//! s'applique.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{RetryPolicy, SyncMode};
use crate::error::SyncError;
use crate::service::{RawError, RawResult};

/// Code par ligne: édition annulée par `rollbackOnFailure`
pub const ROLLBACK_CODE: i64 = 1003;

/// Code par ligne ignoré
pub const IGNORED_CODE: i64 = 1000;

/// Origine d'une annulation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackSignal {
    /// Code 1003 dans les résultats par ligne
    Explicit,
    /// Résultat absent ou vide
    Silent,
}

/// Raison d'un échec récupérable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Timeout,
    AmbiguousQuery,
    BadGateway,
    GatewayTimeout,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RetryReason::Timeout => "timeout",
            RetryReason::AmbiguousQuery => "ambiguous query",
            RetryReason::BadGateway => "bad gateway",
            RetryReason::GatewayTimeout => "gateway timeout",
        })
    }
}

/// Action après l'attente d'un échec récupérable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterBackoff {
    /// Resoumettre le lot
    Resubmit,
    /// Comparer le nombre d'entités distantes au nombre attendu
    VerifyCount,
    /// Considérer le lot comme accepté sans vérification
    AssumeAccepted,
}

/// Issue d'une soumission
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Lot accepté; `rejected` liste (index dans le lot, raison) des lignes refusées
    Accepted { rejected: Vec<(usize, String)> },
    /// Lot annulé côté service
    RolledBack(RollbackSignal),
    /// Échec transitoire
    Retryable {
        reason: RetryReason,
        backoff: Duration,
        then: AfterBackoff,
    },
    /// Échec non classé: lignes du lot en rejet
    DeadLetter { reason: String },
}

/// Règles sur les messages d'erreur, par priorité
const MESSAGE_RULES: &[(&str, RetryReason)] = &[
    (r"(?i)\btimed?\s?out\b", RetryReason::Timeout),
    (r"(?i)unable to perform query|ambiguous", RetryReason::AmbiguousQuery),
    (r"\b50[23]\b", RetryReason::BadGateway),
    (r"\b504\b", RetryReason::GatewayTimeout),
];

fn compiled_rules() -> &'static [(Regex, RetryReason)] {
    static RULES: OnceLock<Vec<(Regex, RetryReason)>> = OnceLock::new();
    RULES.get_or_init(|| {
        MESSAGE_RULES
            .iter()
            .map(|(pattern, reason)| {
                (
                    Regex::new(pattern).expect("message rule patterns are valid"),
                    *reason,
                )
            })
            .collect()
    })
}

/// Première règle correspondant au message
pub fn match_message(message: &str) -> Option<RetryReason> {
    compiled_rules()
        .iter()
        .find(|(pattern, _)| pattern.is_match(message))
        .map(|(_, reason)| *reason)
}

/// Classificateur de réponses, paramétré par la politique de reprise
#[derive(Debug, Clone)]
pub struct RetryClassifier {
    policy: RetryPolicy,
}

impl RetryClassifier {
    pub fn new(policy: &RetryPolicy) -> Self {
        Self {
            policy: policy.clone(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Attente associée à une raison
    pub fn backoff(&self, reason: RetryReason) -> Duration {
        match reason {
            RetryReason::Timeout => self.policy.timeout_backoff(),
            RetryReason::AmbiguousQuery | RetryReason::BadGateway => self.policy.gateway_backoff(),
            RetryReason::GatewayTimeout => self.policy.gateway_timeout_backoff(),
        }
    }

    /// Classe la réponse d'une soumission de lot
    pub fn classify(&self, outcome: &Result<RawResult, RawError>, mode: SyncMode) -> Disposition {
        match outcome {
            Ok(None) => Disposition::RolledBack(RollbackSignal::Silent),
            Ok(Some(results)) if results.is_empty() => {
                Disposition::RolledBack(RollbackSignal::Silent)
            }
            Ok(Some(results)) => {
                let rolled_back = results
                    .iter()
                    .any(|r| r.error.as_ref().is_some_and(|e| e.code == ROLLBACK_CODE));
                if rolled_back {
                    return Disposition::RolledBack(RollbackSignal::Explicit);
                }

                let rejected = results
                    .iter()
                    .enumerate()
                    .filter(|(_, r)| !r.success)
                    .filter_map(|(i, r)| match &r.error {
                        Some(e) if e.code == IGNORED_CODE => None,
                        Some(e) => Some((i, format!("Error code {}: {}", e.code, e.description))),
                        None => Some((i, "Edit failed without error detail".to_string())),
                    })
                    .collect();

                Disposition::Accepted { rejected }
            }
            Err(e) => self.classify_message(&e.message, mode),
        }
    }

    /// Classe un message d'erreur selon la table de règles
    pub fn classify_message(&self, message: &str, mode: SyncMode) -> Disposition {
        match match_message(message) {
            Some(reason) => {
                let then = match (reason, mode) {
                    (RetryReason::Timeout, SyncMode::Upsert) => AfterBackoff::AssumeAccepted,
                    (RetryReason::Timeout, SyncMode::Append) => AfterBackoff::VerifyCount,
                    _ => AfterBackoff::Resubmit,
                };
                Disposition::Retryable {
                    reason,
                    backoff: self.backoff(reason),
                    then,
                }
            }
            None => Disposition::DeadLetter {
                reason: message.to_string(),
            },
        }
    }

    /// Exécute un appel hors lot (requête, comptage, truncate)
    ///
    /// Les échecs récupérables sont retentés sous le même plafond que les
    /// lots; tout autre échec est remonté en `SyncError::Service`.
    pub async fn with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match match_message(&err.message) {
                Some(reason) if attempt < self.policy.max_attempts => {
                    let backoff = self.backoff(reason);
                    warn!(
                        operation,
                        attempt,
                        %reason,
                        backoff_secs = backoff.as_secs(),
                        "Service call failed, retrying"
                    );
                    sleep(backoff).await;
                }
                _ => return Err(SyncError::service(operation, err)),
            }
        }
    }
}

/// Attente asynchrone (sans effet pour une durée nulle)
pub async fn sleep(duration: Duration) {
    if !duration.is_zero() {
        debug!(secs = duration.as_secs(), "Backing off");
        tokio::time::sleep(duration).await;
    }
}
