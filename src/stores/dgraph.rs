//! Dgraph-backed graph store implementation.
//!
//! Speaks the Dgraph HTTP API: DQL queries with variables against
//! `/query`, JSON mutations with `commitNow` against `/mutate`. The
//! atomic transitions of the store contract (OTP consumption, unique
//! channel/credential insertion, challenge deletion) are conditional
//! upserts: one request carries a query block naming the rows it
//! expects plus a mutation guarded by `@if` over that block, and the
//! response's `queries` section tells us whether the guard held at
//! transaction time.
//!
//! # Deadlines
//!
//! Every call runs under the configured deadline. A read that misses
//! it fails `Timeout`; a mutation that misses it fails `Indeterminate`
//! because the commit may have landed. A transaction the server aborts
//! due to a concurrent writer is not an error for the single-row
//! transitions: the other writer won, which the contract reports as
//! `false`.

use crate::config::StoreConfig;
use crate::constants::node_types;
use crate::error::{CoreError, Result};
use crate::providers::GraphStore;
use crate::state::{
    AuditEntry, AuthSession, ChannelOtp, ChannelType, ChallengeType, Role, User, UserChannel,
    WebAuthnChallenge, WebAuthnCredential,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Whether a call is a pure read or may mutate.
#[derive(Clone, Copy)]
enum OpKind {
    Read,
    Write,
}

/// Dgraph response envelope.
#[derive(Debug, serde::Deserialize)]
struct DgraphResponse {
    #[serde(default)]
    data: serde_json::Value,
    #[serde(default)]
    errors: Vec<DgraphError>,
}

#[derive(Debug, serde::Deserialize)]
struct DgraphError {
    #[serde(default)]
    message: String,
}

/// Dgraph-backed [`GraphStore`].
#[derive(Clone)]
pub struct DgraphStore {
    endpoint: String,
    credential: String,
    deadline: Duration,
    client: reqwest::Client,
}

impl DgraphStore {
    /// Create a new Dgraph store handle.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CoreError::Config(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credential: config.credential,
            deadline: Duration::from_millis(config.timeout_millis),
            client,
        })
    }

    /// Run a DQL query with variables, returning the `data` object.
    async fn query(
        &self,
        dql: &str,
        vars: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        let variables: serde_json::Map<String, serde_json::Value> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
            .collect();
        let body = json!({ "query": dql, "variables": variables });

        self.post("/query", body, OpKind::Read).await
    }

    /// Run a mutation body against `/mutate?commitNow=true`.
    async fn mutate(&self, body: serde_json::Value) -> Result<serde_json::Value> {
        self.post("/mutate?commitNow=true", body, OpKind::Write).await
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        kind: OpKind,
    ) -> Result<serde_json::Value> {
        let url = format!("{}{path}", self.endpoint);
        let request = self
            .client
            .post(&url)
            .header("X-Auth-Token", &self.credential)
            .json(&body)
            .send();

        let response = match tokio::time::timeout(self.deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "graph store unreachable");
                return Err(match kind {
                    OpKind::Read => CoreError::Transient("graph store unreachable".into()),
                    // The request may have left the socket before the
                    // failure; a commit cannot be ruled out.
                    OpKind::Write => CoreError::Indeterminate,
                });
            }
            Err(_) => {
                tracing::error!(deadline_ms = self.deadline.as_millis() as u64, "graph store deadline exceeded");
                return Err(match kind {
                    OpKind::Read => CoreError::Timeout,
                    OpKind::Write => CoreError::Indeterminate,
                });
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = %status, "graph store rejected request");
            return Err(CoreError::Transient(format!(
                "graph store returned {status}"
            )));
        }

        let envelope: DgraphResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Serialization(format!("graph store response: {e}")))?;

        if let Some(error) = envelope.errors.first() {
            if error.message.to_lowercase().contains("abort") {
                return Err(CoreError::UniqueViolation("transaction aborted"));
            }
            tracing::error!(message = %error.message, "graph store error");
            return Err(CoreError::Transient("graph store error".into()));
        }

        Ok(envelope.data)
    }

    /// Deserialize the single row of query block `q`, if any.
    fn first_row<T: DeserializeOwned>(data: serde_json::Value) -> Result<Option<T>> {
        let rows = data.get("q").cloned().unwrap_or(serde_json::Value::Null);
        let mut parsed: Vec<T> = match rows {
            serde_json::Value::Null => Vec::new(),
            rows => serde_json::from_value(rows)
                .map_err(|e| CoreError::Serialization(format!("graph store row: {e}")))?,
        };
        Ok(if parsed.is_empty() {
            None
        } else {
            Some(parsed.swap_remove(0))
        })
    }

    /// How many uids query block `q` matched inside an upsert response.
    fn matched(data: &serde_json::Value) -> usize {
        data.get("queries")
            .and_then(|queries| queries.get("q"))
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Insert one node with a blank uid and return the minted uid.
    async fn create_node(
        &self,
        node_type: &str,
        blank: &str,
        payload: &impl serde::Serialize,
    ) -> Result<String> {
        let node = node_json(node_type, blank, payload)?;
        let data = self.mutate(json!({ "set": [node] })).await?;
        minted_uid(&data, blank)
    }
}

/// Serialize an entity and stamp its blank uid and `dgraph.type`.
fn node_json(
    node_type: &str,
    blank: &str,
    payload: &impl serde::Serialize,
) -> Result<serde_json::Value> {
    let mut node = serde_json::to_value(payload)
        .map_err(|e| CoreError::Serialization(format!("graph store payload: {e}")))?;
    let Some(object) = node.as_object_mut() else {
        return Err(CoreError::Serialization("payload is not an object".into()));
    };
    object.insert("uid".into(), format!("_:{blank}").into());
    object.insert("dgraph.type".into(), node_type.into());
    Ok(node)
}

fn minted_uid(data: &serde_json::Value, blank: &str) -> Result<String> {
    data.get("uids")
        .and_then(|uids| uids.get(blank))
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| CoreError::Serialization("mutation response missing uid".into()))
}

/// Quote a value for inlining into an upsert query block. Every value
/// that reaches here is machine-derived (hex digests, uids, enum
/// names), the escaping is belt and braces.
fn dql_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn rfc3339(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl GraphStore for DgraphStore {
    async fn create_otp(&self, otp: ChannelOtp) -> Result<String> {
        self.create_node(node_types::CHANNEL_OTP, "otp", &otp).await
    }

    async fn find_unconsumed_otp(
        &self,
        channel_hash: &str,
        otp_hash: &str,
    ) -> Result<Option<ChannelOtp>> {
        let dql = r"query q($channelHash: string, $otpHash: string) {
            q(func: type(ChannelOTP)) @filter(
                eq(channelHash, $channelHash)
                AND eq(otpHash, $otpHash)
                AND eq(verified, false)
                AND eq(used, false)
            ) {
                uid channelHash channelType otpHash verified used
                expiresAt createdAt userId purpose
            }
        }";
        let data = self
            .query(
                dql,
                &[
                    ("$channelHash", channel_hash.to_string()),
                    ("$otpHash", otp_hash.to_string()),
                ],
            )
            .await?;
        Self::first_row(data)
    }

    async fn consume_otp(&self, uid: &str) -> Result<bool> {
        let query = format!(
            "{{ q(func: uid({uid})) @filter(eq(verified, false) AND eq(used, false)) {{ v as uid }} }}"
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(eq(len(v), 1))",
                "set": [{ "uid": "uid(v)", "verified": true, "used": true }],
            }],
        });

        match self.mutate(body).await {
            Ok(data) => Ok(Self::matched(&data) == 1),
            // A concurrent verifier's commit aborted ours: they won.
            Err(CoreError::UniqueViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn find_channel(
        &self,
        channel_hash: &str,
        channel_type: ChannelType,
    ) -> Result<Option<UserChannel>> {
        let dql = r"query q($channelHash: string, $channelType: string) {
            q(func: type(UserChannel)) @filter(
                eq(channelHash, $channelHash) AND eq(channelType, $channelType)
            ) {
                uid userId channelType channelHash verified primary
                createdAt lastUsedAt
            }
        }";
        let data = self
            .query(
                dql,
                &[
                    ("$channelHash", channel_hash.to_string()),
                    ("$channelType", channel_type.as_str().to_string()),
                ],
            )
            .await?;
        Self::first_row(data)
    }

    async fn create_pending_user(
        &self,
        user: User,
        channel: UserChannel,
    ) -> Result<(String, String)> {
        let query = format!(
            "{{ q(func: type(UserChannel)) @filter(eq(channelHash, {hash}) AND eq(channelType, {ct})) {{ u as uid }} }}",
            hash = dql_string(&channel.channel_hash),
            ct = dql_string(channel.channel_type.as_str()),
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(eq(len(u), 0))",
                "set": [
                    node_json(node_types::USER, "user", &user)?,
                    node_json(node_types::USER_CHANNEL, "channel", &channel)?,
                ],
            }],
        });

        let data = match self.mutate(body).await {
            Ok(data) => data,
            Err(CoreError::UniqueViolation(_)) => {
                return Err(CoreError::UniqueViolation(
                    "UserChannel(channelHash, channelType)",
                ));
            }
            Err(e) => return Err(e),
        };

        if Self::matched(&data) > 0 {
            return Err(CoreError::UniqueViolation(
                "UserChannel(channelHash, channelType)",
            ));
        }

        Ok((minted_uid(&data, "user")?, minted_uid(&data, "channel")?))
    }

    async fn touch_channel(&self, uid: &str, now: DateTime<Utc>) -> Result<()> {
        self.mutate(json!({
            "set": [{ "uid": uid, "lastUsedAt": rfc3339(now) }],
        }))
        .await?;
        Ok(())
    }

    async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        let dql = r"query q($did: string) {
            q(func: type(User)) @filter(eq(did, $did)) {
                uid status did createdAt updatedAt
                roles { uid name }
            }
        }";
        let data = self.query(dql, &[("$did", user_id.to_string())]).await?;
        Self::first_row(data)
    }

    async fn activate_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let query = format!(
            "{{ q(func: type(User)) @filter(eq(did, {did}) AND eq(status, \"PENDING\")) {{ u as uid }} }}",
            did = dql_string(user_id),
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(eq(len(u), 1))",
                "set": [{
                    "uid": "uid(u)",
                    "status": "ACTIVE",
                    "updatedAt": rfc3339(now),
                }],
            }],
        });

        match self.mutate(body).await {
            Ok(data) => Ok(Self::matched(&data) == 1),
            Err(CoreError::UniqueViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn find_role(&self, name: &str) -> Result<Option<Role>> {
        let dql = r"query q($name: string) {
            q(func: type(Role)) @filter(eq(name, $name)) { uid name }
        }";
        let data = self.query(dql, &[("$name", name.to_string())]).await?;
        Self::first_row(data)
    }

    async fn create_challenge(&self, challenge: WebAuthnChallenge) -> Result<String> {
        self.create_node(node_types::WEBAUTHN_CHALLENGE, "challenge", &challenge)
            .await
    }

    async fn find_challenge(
        &self,
        challenge: &str,
        user_id: &str,
        challenge_type: ChallengeType,
    ) -> Result<Option<WebAuthnChallenge>> {
        let dql = r"query q($challenge: string, $userId: string, $challengeType: string) {
            q(func: type(WebAuthnChallenge)) @filter(
                eq(challenge, $challenge)
                AND eq(userId, $userId)
                AND eq(challengeType, $challengeType)
            ) {
                uid challenge userId challengeType expiresAt createdAt
            }
        }";
        let data = self
            .query(
                dql,
                &[
                    ("$challenge", challenge.to_string()),
                    ("$userId", user_id.to_string()),
                    ("$challengeType", challenge_type.as_str().to_string()),
                ],
            )
            .await?;
        Self::first_row(data)
    }

    async fn delete_challenge(&self, uid: &str) -> Result<bool> {
        let query = format!(
            "{{ q(func: uid({uid})) @filter(type(WebAuthnChallenge)) {{ u as uid }} }}"
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(eq(len(u), 1))",
                "delete": [{ "uid": "uid(u)" }],
            }],
        });

        match self.mutate(body).await {
            Ok(data) => Ok(Self::matched(&data) == 1),
            // Aborted by the concurrent deleter: they consumed it.
            Err(CoreError::UniqueViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn purge_expired_challenges(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = format!(
            "{{ q(func: type(WebAuthnChallenge)) @filter(lt(expiresAt, {now})) {{ u as uid }} }}",
            now = dql_string(&rfc3339(now)),
        );
        let body = json!({
            "query": query,
            "mutations": [{ "delete": [{ "uid": "uid(u)" }] }],
        });

        let data = self.mutate(body).await?;
        Ok(Self::matched(&data) as u64)
    }

    async fn create_credential(&self, credential: WebAuthnCredential) -> Result<String> {
        let query = format!(
            "{{ q(func: type(WebAuthnCredential)) @filter(eq(credentialId, {id})) {{ u as uid }} }}",
            id = dql_string(&credential.credential_id),
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(eq(len(u), 0))",
                "set": [node_json(node_types::WEBAUTHN_CREDENTIAL, "credential", &credential)?],
            }],
        });

        let data = self.mutate(body).await?;
        if Self::matched(&data) > 0 {
            return Err(CoreError::UniqueViolation("WebAuthnCredential(credentialId)"));
        }
        minted_uid(&data, "credential")
    }

    async fn credentials_for_user(&self, user_id: &str) -> Result<Vec<WebAuthnCredential>> {
        let dql = r"query q($userId: string) {
            q(func: type(WebAuthnCredential), orderasc: addedAt)
                @filter(eq(userId, $userId)) {
                uid userId credentialId publicKey signCount transports addedAt
            }
        }";
        let data = self.query(dql, &[("$userId", user_id.to_string())]).await?;
        let rows = data.get("q").cloned().unwrap_or(json!([]));
        serde_json::from_value(rows)
            .map_err(|e| CoreError::Serialization(format!("graph store row: {e}")))
    }

    async fn update_sign_count(&self, uid: &str, sign_count: u32) -> Result<()> {
        self.mutate(json!({
            "set": [{ "uid": uid, "signCount": sign_count }],
        }))
        .await?;
        Ok(())
    }

    async fn create_session(&self, session: AuthSession) -> Result<String> {
        self.create_node(node_types::AUTH_SESSION, "session", &session).await
    }

    async fn find_session(&self, token_hash: &str) -> Result<Option<AuthSession>> {
        let dql = r"query q($tokenHash: string) {
            q(func: type(AuthSession)) @filter(eq(tokenHash, $tokenHash)) {
                uid userId method tokenHash createdAt expiresAt valid
                lastUsed ipAddress userAgent deviceId
            }
        }";
        let data = self
            .query(dql, &[("$tokenHash", token_hash.to_string())])
            .await?;
        Self::first_row(data)
    }

    async fn revoke_session(&self, token_hash: &str, _now: DateTime<Utc>) -> Result<bool> {
        let query = format!(
            "{{ q(func: type(AuthSession)) @filter(eq(tokenHash, {hash})) {{ u as uid }} }}",
            hash = dql_string(token_hash),
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(ge(len(u), 1))",
                "set": [{ "uid": "uid(u)", "valid": false }],
            }],
        });

        let data = self.mutate(body).await?;
        Ok(Self::matched(&data) >= 1)
    }

    async fn touch_session(&self, token_hash: &str, now: DateTime<Utc>) -> Result<()> {
        let query = format!(
            "{{ q(func: type(AuthSession)) @filter(eq(tokenHash, {hash})) {{ u as uid }} }}",
            hash = dql_string(token_hash),
        );
        let body = json!({
            "query": query,
            "mutations": [{
                "cond": "@if(ge(len(u), 1))",
                "set": [{ "uid": "uid(u)", "lastUsed": rfc3339(now) }],
            }],
        });

        self.mutate(body).await?;
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<String> {
        self.create_node(node_types::AUDIT_ENTRY, "audit", &entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dql_string_escaping() {
        assert_eq!(dql_string("abc"), "\"abc\"");
        assert_eq!(dql_string("a\"b"), "\"a\\\"b\"");
        assert_eq!(dql_string("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_node_json_stamps_type_and_blank_uid() {
        let role = Role {
            uid: String::new(),
            name: "registered".into(),
        };
        let node = node_json("Role", "role", &role).unwrap();
        assert_eq!(node["uid"], "_:role");
        assert_eq!(node["dgraph.type"], "Role");
        assert_eq!(node["name"], "registered");
    }

    #[test]
    fn test_matched_counts_query_block() {
        let data = json!({ "queries": { "q": [{ "uid": "0x1" }, { "uid": "0x2" }] } });
        assert_eq!(DgraphStore::matched(&data), 2);
        assert_eq!(DgraphStore::matched(&json!({})), 0);
    }

    #[test]
    fn test_minted_uid_lookup() {
        let data = json!({ "uids": { "user": "0x2a" } });
        assert_eq!(minted_uid(&data, "user").unwrap(), "0x2a");
        assert!(minted_uid(&data, "channel").is_err());
    }
}
