//! Rule synchronization.
//!
//! Keeps the remote rule set matching exactly the tracked handles. Three
//! operations are provided:
//!
//! 1. `resync` - replace every remote rule with a freshly packed set
//! 2. `add_one` - extend the first rule with room for one more handle
//! 3. `remove_one` - rebuild the rule holding a handle without it
//!
//! Remote rules are immutable: editing one means deleting it and creating its
//! replacement, so the rule id changes on every edit.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tweetwatch_core::{pack_bodies, Handle, Rule, RuleBody, RuleError, RuleId, RuleLimits};

use crate::client::RuleClient;
use crate::convergence::{fingerprint, RemoteMembership};
use crate::error::{Result, StreamError};

/// Synchronizer configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Rule count and length limits of the remote service.
    pub limits: RuleLimits,
    /// Timeout for each remote call.
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            limits: RuleLimits::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Summary of a resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Rules deleted from the remote.
    pub deleted: usize,
    /// Rules created, in packing order.
    pub created: Vec<Rule>,
    /// The remote already held exactly the packed rules.
    pub unchanged: bool,
}

/// Outcome of [`RuleSynchronizer::add_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// A new single-handle rule was created.
    Created(Rule),
    /// An existing rule was replaced by one that also holds the handle.
    Extended { replaced: RuleId, rule: Rule },
    /// A remote rule already matches the handle.
    AlreadyPresent,
}

/// Outcome of [`RuleSynchronizer::remove_one`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The rule held other handles and was rebuilt without this one.
    Rebuilt { replaced: RuleId, rule: Rule },
    /// The rule held only this handle and was deleted.
    Deleted(RuleId),
    /// No remote rule matches the handle.
    NotPresent,
}

/// Drives the remote rule API.
///
/// Operations are serialized internally: each one reads the remote rules and
/// acts on what it read, so two interleaved operations could lose an edit.
pub struct RuleSynchronizer<R: RuleClient> {
    client: R,
    config: SyncConfig,
    mutation: Mutex<()>,
}

impl<R: RuleClient> RuleSynchronizer<R> {
    pub fn new(client: R, config: SyncConfig) -> Self {
        Self {
            client,
            config,
            mutation: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    pub fn limits(&self) -> &RuleLimits {
        &self.config.limits
    }

    /// Replace the remote rules with the packing of `targets`.
    ///
    /// Packing happens before any remote call, so a capacity or length error
    /// leaves the remote untouched. If the remote already holds exactly the
    /// packed rules nothing is written.
    pub async fn resync(&self, targets: &[Handle]) -> Result<SyncReport> {
        let _guard = self.mutation.lock().await;

        let bodies = pack_bodies(targets, &self.config.limits)?;
        let expressions: Vec<String> = bodies.iter().map(RuleBody::to_expression).collect();

        let existing = self.call("fetch rules", self.client.get_rules()).await?;

        let current: Vec<&str> = existing.iter().map(|r| r.expression.as_str()).collect();
        if current == expressions {
            tracing::debug!(rules = existing.len(), "remote rules already in sync");
            return Ok(SyncReport {
                deleted: 0,
                created: existing,
                unchanged: true,
            });
        }

        let stale: Vec<RuleId> = existing.iter().filter_map(|r| r.id.clone()).collect();
        if !stale.is_empty() {
            self.call("delete rules", self.client.delete_rules(&stale))
                .await?;
        }

        let mut created = Vec::with_capacity(expressions.len());
        for expression in &expressions {
            created.push(self.call("create rule", self.client.add_rules(expression)).await?);
        }

        tracing::info!(
            handles = targets.len(),
            deleted = stale.len(),
            created = created.len(),
            fingerprint = %fingerprint(targets),
            "resynced remote rules"
        );

        Ok(SyncReport {
            deleted: stale.len(),
            created,
            unchanged: false,
        })
    }

    /// Make the remote match `handle` with as few writes as possible.
    ///
    /// The handle joins the first rule it fits in; if none has room a new
    /// rule is created, unless the rule count is already at its limit.
    pub async fn add_one(&self, handle: &Handle) -> Result<AddOutcome> {
        let _guard = self.mutation.lock().await;
        let limits = self.config.limits;

        if RuleBody::predicate_len(handle) > limits.max_rule_len {
            return Err(RuleError::HandleTooLong {
                handle: handle.to_string(),
                max_rule_len: limits.max_rule_len,
            }
            .into());
        }

        let rules = self.call("fetch rules", self.client.get_rules()).await?;
        let parsed = parse_managed(&rules);

        if parsed.iter().any(|(_, body)| body.contains(handle)) {
            tracing::debug!(%handle, "handle already matched by a remote rule");
            return Ok(AddOutcome::AlreadyPresent);
        }

        let target = parsed
            .iter()
            .find(|(_, body)| body.expression_len_with(handle) <= limits.max_rule_len);

        if let Some((rule, body)) = target {
            let mut extended = body.clone();
            extended.insert(handle.clone());
            let (replaced, rule) = self.replace(rule, &extended, body).await?;
            tracing::info!(%handle, %replaced, rule = %rule.expression, "extended remote rule");
            return Ok(AddOutcome::Extended { replaced, rule });
        }

        if rules.len() >= limits.max_rules {
            let tracked: usize = parsed.iter().map(|(_, body)| body.len()).sum();
            return Err(RuleError::CapacityExceeded {
                max_rules: limits.max_rules,
                max_rule_len: limits.max_rule_len,
                handles: tracked + 1,
            }
            .into());
        }

        let expression = RuleBody::single(handle.clone()).to_expression();
        let rule = self.call("create rule", self.client.add_rules(&expression)).await?;
        tracing::info!(%handle, rule = %rule.expression, "created remote rule");
        Ok(AddOutcome::Created(rule))
    }

    /// Stop matching `handle`, preserving every other handle.
    pub async fn remove_one(&self, handle: &Handle) -> Result<RemoveOutcome> {
        let _guard = self.mutation.lock().await;

        let rules = self.call("fetch rules", self.client.get_rules()).await?;
        let parsed = parse_managed(&rules);

        let Some((rule, body)) = parsed.iter().find(|(_, body)| body.contains(handle)) else {
            tracing::debug!(%handle, "handle not matched by any remote rule");
            return Ok(RemoveOutcome::NotPresent);
        };

        let mut remaining = body.clone();
        remaining.remove(handle);

        if remaining.is_empty() {
            let id = remote_id(rule)?;
            self.call("delete rule", self.client.delete_rules(std::slice::from_ref(&id)))
                .await?;
            tracing::info!(%handle, rule_id = %id, "deleted remote rule");
            return Ok(RemoveOutcome::Deleted(id));
        }

        let (replaced, rule) = self.replace(rule, &remaining, body).await?;
        tracing::info!(%handle, %replaced, rule = %rule.expression, "rebuilt remote rule");
        Ok(RemoveOutcome::Rebuilt { replaced, rule })
    }

    /// Handles currently matched by the remote rules.
    pub async fn remote_membership(&self) -> Result<RemoteMembership> {
        let rules = self.call("fetch rules", self.client.get_rules()).await?;
        Ok(RemoteMembership::from_rules(&rules))
    }

    /// Delete `rule` and create `body` in its place.
    ///
    /// If the create fails, `previous` is put back so the remote does not lose
    /// the handles it held.
    async fn replace(
        &self,
        rule: &Rule,
        body: &RuleBody,
        previous: &RuleBody,
    ) -> Result<(RuleId, Rule)> {
        let id = remote_id(rule)?;
        self.call("delete rule", self.client.delete_rules(std::slice::from_ref(&id)))
            .await?;

        match self
            .call("create rule", self.client.add_rules(&body.to_expression()))
            .await
        {
            Ok(created) => Ok((id, created)),
            Err(e) => {
                tracing::error!(rule_id = %id, "failed to create replacement rule: {}", e);
                let expression = previous.to_expression();
                if let Err(restore_err) = self
                    .call("restore rule", self.client.add_rules(&expression))
                    .await
                {
                    tracing::error!(
                        rule = %expression,
                        "failed to restore rule; a resync is required: {}",
                        restore_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn call<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| StreamError::Timeout(format!("{} took longer than {:?}", what, timeout)))?
    }
}

/// Rules we manage, with their parsed bodies. Foreign rules are skipped.
fn parse_managed(rules: &[Rule]) -> Vec<(&Rule, RuleBody)> {
    rules
        .iter()
        .filter_map(|rule| match rule.body() {
            Ok(body) => Some((rule, body)),
            Err(_) => {
                tracing::debug!(rule = %rule.expression, "skipping foreign rule");
                None
            }
        })
        .collect()
}

fn remote_id(rule: &Rule) -> Result<RuleId> {
    rule.id.clone().ok_or_else(|| {
        StreamError::Malformed(format!("remote rule {:?} has no id", rule.expression))
    })
}
