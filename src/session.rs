//! Session records with a per-user index for bulk revocation.
//!
//! Each session lives under `session:{token}` with its own TTL. The set under
//! `user_sessions:{user}` indexes the owner's tokens; its TTL is raised to cover the longest
//! session ever written to it. Index members can outlive their records (a record expired on
//! its own); readers skip them and revocation tolerates them.

// self
use crate::{
	_prelude::*,
	Payload,
	config::KvConfig,
	id::{SessionToken, UserId},
	keys,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{self, Expiry, KvStore},
};

const RESERVED_FIELDS: [&str; 3] = ["user_id", "session_id", "created_at"];

/// Stored session document.
///
/// Serializes as one flat JSON object: the injected `user_id`, `session_id`, and RFC 3339
/// `created_at` fields next to the caller's payload fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
	/// Owner of the session.
	pub user_id: UserId,
	/// Token naming the session.
	pub session_id: SessionToken,
	/// Creation instant.
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	/// Caller-defined fields.
	#[serde(flatten)]
	pub data: Payload,
}
impl Session {
	fn new(user_id: UserId, session_id: SessionToken, mut data: Payload) -> Self {
		strip_reserved(&mut data);

		Self { user_id, session_id, created_at: OffsetDateTime::now_utc(), data }
	}

	/// Looks up a caller-defined field.
	pub fn field(&self, name: &str) -> Option<&Value> {
		self.data.get(name)
	}
}

/// Session lifecycle over the shared store.
#[derive(Clone, Debug)]
pub struct SessionStore {
	store: KvStore,
	default_ttl: Duration,
}
impl SessionStore {
	const DEFAULT_TTL: Duration = Duration::hours(24);

	/// Creates a session store with the default 24 hour TTL.
	pub fn new(store: KvStore) -> Self {
		Self { store, default_ttl: Self::DEFAULT_TTL }
	}

	/// Creates a session store using the configured TTL.
	pub fn from_config(store: KvStore, config: &KvConfig) -> Self {
		Self::new(store).with_default_ttl(config.session_ttl())
	}

	/// Overrides the TTL used when callers do not pass one.
	pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
		self.default_ttl = ttl;

		self
	}

	/// Writes a new session and indexes it under its owner.
	///
	/// Caller-supplied `user_id`, `session_id`, or `created_at` fields are overridden.
	pub async fn create(
		&self,
		user: &UserId,
		token: &SessionToken,
		payload: Payload,
		ttl: Option<Duration>,
	) -> Result<Session> {
		let span = OpSpan::new(OpKind::Session, "create");
		let ttl = ttl.unwrap_or(self.default_ttl);
		let session = Session::new(user.clone(), token.clone(), payload);

		// Index before record: a partial failure may leave a dangling index entry, never an
		// unindexed live session.
		span.instrument(async {
			self.store.add_to_set(&keys::user_sessions(user), token.as_str()).await?;
			self.raise_index_ttl(user, ttl).await?;
			self.store.set_json(&keys::session(token), &session, Expiry::After(ttl)).await?;

			Ok::<_, Error>(())
		})
		.await
		.inspect(|_| obs::record_op_outcome(OpKind::Session, OpOutcome::Success))
		.inspect_err(|_| obs::record_op_outcome(OpKind::Session, OpOutcome::Failure))?;

		Ok(session)
	}

	/// Reads a session.
	///
	/// Fails closed: a store failure or an undecodable record reads as no session.
	pub async fn get(&self, token: &SessionToken) -> Option<Session> {
		match self.store.get_json::<Session>(&keys::session(token)).await {
			Ok(session) => session,
			Err(_) => {
				obs::record_op_outcome(OpKind::Session, OpOutcome::Degraded);

				None
			},
		}
	}

	/// Merges `partial` into an existing session's fields.
	///
	/// Returns `false` without writing when the session does not exist, including when it
	/// expires between the read and the write. Without `extend_ttl` the record keeps its
	/// remaining TTL; with it the TTL restarts and the owner's index is stretched to cover it.
	pub async fn update(
		&self,
		token: &SessionToken,
		partial: Payload,
		extend_ttl: Option<Duration>,
	) -> Result<bool> {
		let key = keys::session(token);
		let Some(mut session) = self.store.get_json::<Session>(&key).await? else {
			return Ok(false);
		};

		session.data.extend(partial);
		strip_reserved(&mut session.data);

		let expiry = extend_ttl.map_or(Expiry::Keep, Expiry::After);

		if !self.store.set_json_if_exists(&key, &session, expiry).await? {
			return Ok(false);
		}

		if let Some(ttl) = extend_ttl {
			self.raise_index_ttl(&session.user_id, ttl).await?;
		}

		Ok(true)
	}

	/// Restarts a session's TTL without touching its fields.
	pub async fn touch(&self, token: &SessionToken, ttl: Duration) -> Result<bool> {
		let key = keys::session(token);
		let Some(session) = self.store.get_json::<Session>(&key).await? else {
			return Ok(false);
		};

		if !self.store.expire(&key, ttl).await? {
			return Ok(false);
		}

		self.raise_index_ttl(&session.user_id, ttl).await?;

		Ok(true)
	}

	/// Deletes one session, returning whether it existed.
	///
	/// The owner is read from the record to unlink the token from the index. An undecodable
	/// record is still deleted; its index entry is skipped by readers until the index
	/// expires.
	pub async fn invalidate(&self, token: &SessionToken) -> Result<bool> {
		let key = keys::session(token);
		let Some(raw) = self.store.get(&key).await? else {
			return Ok(false);
		};
		let owner = store::decode_json::<Session>(&key, &raw).ok().map(|s| s.user_id);
		let existed = self.store.delete(&key).await?;

		if let Some(user) = owner {
			self.store.remove_from_set(&keys::user_sessions(&user), token.as_str()).await?;
		}

		Ok(existed)
	}

	/// Deletes every session indexed under the user and the index itself, returning how many
	/// records were removed.
	pub async fn invalidate_all_for_user(&self, user: &UserId) -> Result<usize> {
		let index = keys::user_sessions(user);
		let mut removed = 0;

		for member in self.store.members_of_set(&index).await? {
			let Ok(token) = SessionToken::new(&member) else { continue };

			if self.store.delete(&keys::session(&token)).await? {
				removed += 1;
			}
		}

		self.store.delete(&index).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(user = %user, removed, "revoked all sessions");

		Ok(removed)
	}

	/// Lists the user's live session tokens, pruning index entries whose record is gone.
	pub async fn list_for_user(&self, user: &UserId) -> Result<Vec<SessionToken>> {
		let index = keys::user_sessions(user);
		let mut live = Vec::new();

		for member in self.store.members_of_set(&index).await? {
			let token = SessionToken::new(&member).ok();
			let exists = match &token {
				Some(token) => self.store.exists(&keys::session(token)).await?,
				None => false,
			};

			match token {
				Some(token) if exists => live.push(token),
				_ => {
					self.store.remove_from_set(&index, &member).await?;
				},
			}
		}

		live.sort();

		Ok(live)
	}

	async fn raise_index_ttl(&self, user: &UserId, ttl: Duration) -> Result<()> {
		let index = keys::user_sessions(user);

		match self.store.time_to_live(&index).await? {
			Some(current) if current >= ttl => {},
			_ => {
				self.store.expire(&index, ttl).await?;
			},
		}

		Ok(())
	}
}

fn strip_reserved(data: &mut Payload) {
	for field in RESERVED_FIELDS {
		data.remove(field);
	}
}
