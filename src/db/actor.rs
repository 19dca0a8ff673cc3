use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, sqlite::SqliteRow};
use std::path::Path;
use std::{str::FromStr, time::Duration};
use tracing::{info, warn};

use crate::domain::{Account, Pool};
use crate::error::ProxyError;

use super::models::{Credentials, parse_pool};

#[derive(Debug)]
pub enum DbActorMessage {
    Get(Pool, Account, RpcReplyPort<Result<Option<Credentials>, ProxyError>>),
    GetAll(Pool, RpcReplyPort<Result<Vec<(Account, Credentials)>, ProxyError>>),
    Save(Pool, Account, Box<Credentials>, RpcReplyPort<Result<(), ProxyError>>),
    Remove(Pool, Option<Account>, RpcReplyPort<Result<(), ProxyError>>),
    NextAccount(Pool, RpcReplyPort<Result<Account, ProxyError>>),
    Count(Pool, RpcReplyPort<Result<i64, ProxyError>>),
    FindByIdentity(
        Pool,
        Option<String>,
        Option<String>,
        RpcReplyPort<Result<Option<Account>, ProxyError>>,
    ),
    Exists(Pool, RpcReplyPort<Result<bool, ProxyError>>),
}

#[derive(Clone)]
pub struct CredentialActorHandle {
    actor: ActorRef<DbActorMessage>,
}

macro_rules! rpc {
    ($self:expr, $enum_:ident :: $variant:ident ( $a:expr, _ )) => {
        ractor::call!($self.actor, $enum_::$variant, $a)
            .map_err(|e| ProxyError::Ractor(format!("CredentialActor RPC failed: {e}")))?
    };
    ($self:expr, $enum_:ident :: $variant:ident ( $a:expr, $b:expr, _ )) => {
        ractor::call!($self.actor, $enum_::$variant, $a, $b)
            .map_err(|e| ProxyError::Ractor(format!("CredentialActor RPC failed: {e}")))?
    };
    ($self:expr, $enum_:ident :: $variant:ident ( $a:expr, $b:expr, $c:expr, _ )) => {
        ractor::call!($self.actor, $enum_::$variant, $a, $b, $c)
            .map_err(|e| ProxyError::Ractor(format!("CredentialActor RPC failed: {e}")))?
    };
}

impl CredentialActorHandle {
    pub async fn get(&self, pool: Pool, account: Account) -> Result<Option<Credentials>, ProxyError> {
        rpc!(self, DbActorMessage::Get(pool, account, _))
    }

    pub async fn get_all(&self, pool: Pool) -> Result<Vec<(Account, Credentials)>, ProxyError> {
        rpc!(self, DbActorMessage::GetAll(pool, _))
    }

    pub async fn save(
        &self,
        pool: Pool,
        account: Account,
        credentials: Credentials,
    ) -> Result<(), ProxyError> {
        rpc!(
            self,
            DbActorMessage::Save(pool, account, Box::new(credentials), _)
        )
    }

    pub async fn remove(&self, pool: Pool, account: Option<Account>) -> Result<(), ProxyError> {
        rpc!(self, DbActorMessage::Remove(pool, account, _))
    }

    pub async fn next_account(&self, pool: Pool) -> Result<Account, ProxyError> {
        rpc!(self, DbActorMessage::NextAccount(pool, _))
    }

    pub async fn count(&self, pool: Pool) -> Result<i64, ProxyError> {
        rpc!(self, DbActorMessage::Count(pool, _))
    }

    pub async fn find_by_identity(
        &self,
        pool: Pool,
        email: Option<String>,
        account_id: Option<String>,
    ) -> Result<Option<Account>, ProxyError> {
        rpc!(
            self,
            DbActorMessage::FindByIdentity(pool, email, account_id, _)
        )
    }

    pub async fn exists(&self, pool: Pool) -> Result<bool, ProxyError> {
        rpc!(self, DbActorMessage::Exists(pool, _))
    }
}

pub struct CredentialActorState {
    db: SqlitePool,
}

pub struct CredentialActor;

#[ractor::async_trait]
impl Actor for CredentialActor {
    type Msg = DbActorMessage;
    type State = CredentialActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        ensure_parent_dir_private(&database_url)?;

        let connect_opts = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        for stmt in super::schema::SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if !s.is_empty() {
                sqlx::query(s)
                    .execute(&db)
                    .await
                    .map_err(|e| ActorProcessingErr::from(format!("schema init failed: {e}")))?;
            }
        }

        info!("CredentialActor initialized");
        Ok(CredentialActorState { db })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DbActorMessage::Get(pool, account, reply) => {
                let _ = reply.send(get(&state.db, pool, account).await);
            }
            DbActorMessage::GetAll(pool, reply) => {
                let _ = reply.send(get_all(&state.db, pool).await);
            }
            DbActorMessage::Save(pool, account, creds, reply) => {
                let _ = reply.send(save(&state.db, pool, account, *creds).await);
            }
            DbActorMessage::Remove(pool, account, reply) => {
                let _ = reply.send(remove(&state.db, pool, account).await);
            }
            DbActorMessage::NextAccount(pool, reply) => {
                let _ = reply.send(next_account(&state.db, pool).await);
            }
            DbActorMessage::Count(pool, reply) => {
                let _ = reply.send(count(&state.db, pool).await);
            }
            DbActorMessage::FindByIdentity(pool, email, account_id, reply) => {
                let _ = reply.send(
                    find_by_identity(&state.db, pool, email.as_deref(), account_id.as_deref())
                        .await,
                );
            }
            DbActorMessage::Exists(pool, reply) => {
                let _ = reply.send(exists(&state.db, pool).await);
            }
        }
        Ok(())
    }
}

fn row_to_credentials(row: &SqliteRow) -> Result<Credentials, sqlx::Error> {
    Ok(Credentials {
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: row.try_get("expires_at_ms")?,
        project_id: row.try_get("project_id")?,
        email: row.try_get("email")?,
        account_id: row.try_get("account_id")?,
    })
}

async fn get(db: &SqlitePool, pool: Pool, account: Account) -> Result<Option<Credentials>, ProxyError> {
    let row = sqlx::query(
        "SELECT id, access_token, refresh_token, expires_at_ms, project_id, email, account_id
         FROM credentials WHERE provider = ? AND account = ?",
    )
    .bind(pool.as_str())
    .bind(account)
    .fetch_optional(db)
    .await?;

    let Some(row) = row else { return Ok(None) };
    match row_to_credentials(&row) {
        Ok(c) => Ok(Some(c)),
        Err(e) => {
            let id: i64 = row.try_get("id").unwrap_or(-1);
            warn!(%id, %pool, %account, error = %e, "corrupt credential row, deleting");
            sqlx::query("DELETE FROM credentials WHERE id = ?")
                .bind(id)
                .execute(db)
                .await?;
            Ok(None)
        }
    }
}

async fn get_all(db: &SqlitePool, pool: Pool) -> Result<Vec<(Account, Credentials)>, ProxyError> {
    let rows = sqlx::query(
        "SELECT id, account, access_token, refresh_token, expires_at_ms, project_id, email, account_id
         FROM credentials WHERE provider = ? ORDER BY account",
    )
    .bind(pool.as_str())
    .fetch_all(db)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    let mut corrupt_ids = Vec::new();
    for row in &rows {
        let account: Account = row.try_get("account")?;
        match row_to_credentials(row) {
            Ok(c) => out.push((account, c)),
            Err(e) => {
                let id: i64 = row.try_get("id").unwrap_or(-1);
                warn!(%id, %pool, error = %e, "corrupt credential row, deleting");
                corrupt_ids.push(id);
            }
        }
    }
    for id in corrupt_ids {
        sqlx::query("DELETE FROM credentials WHERE id = ?")
            .bind(id)
            .execute(db)
            .await?;
    }
    Ok(out)
}

async fn save(
    db: &SqlitePool,
    pool: Pool,
    account: Account,
    c: Credentials,
) -> Result<(), ProxyError> {
    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO credentials (
            provider, account, email, account_id, project_id,
            access_token, refresh_token, expires_at_ms, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(provider, account) DO UPDATE SET
            email = excluded.email,
            account_id = excluded.account_id,
            project_id = excluded.project_id,
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at_ms = excluded.expires_at_ms,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(pool.as_str())
    .bind(account)
    .bind(&c.email)
    .bind(&c.account_id)
    .bind(&c.project_id)
    .bind(&c.access_token)
    .bind(&c.refresh_token)
    .bind(c.expires_at)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?;
    Ok(())
}

async fn remove(db: &SqlitePool, pool: Pool, account: Option<Account>) -> Result<(), ProxyError> {
    match account {
        Some(account) => {
            sqlx::query("DELETE FROM credentials WHERE provider = ? AND account = ?")
                .bind(pool.as_str())
                .bind(account)
                .execute(db)
                .await?;
        }
        None => {
            sqlx::query("DELETE FROM credentials WHERE provider = ?")
                .bind(pool.as_str())
                .execute(db)
                .await?;
        }
    }
    Ok(())
}

async fn next_account(db: &SqlitePool, pool: Pool) -> Result<Account, ProxyError> {
    let row: Option<(Option<i64>,)> =
        sqlx::query_as("SELECT MAX(account) FROM credentials WHERE provider = ?")
            .bind(pool.as_str())
            .fetch_optional(db)
            .await?;
    Ok(row.and_then(|(m,)| m).map_or(0, |m| m + 1))
}

async fn count(db: &SqlitePool, pool: Pool) -> Result<i64, ProxyError> {
    let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credentials WHERE provider = ?")
        .bind(pool.as_str())
        .fetch_one(db)
        .await?;
    Ok(n)
}

async fn find_by_identity(
    db: &SqlitePool,
    pool: Pool,
    email: Option<&str>,
    account_id: Option<&str>,
) -> Result<Option<Account>, ProxyError> {
    for (account, creds) in get_all(db, pool).await? {
        if creds.matches_identity(email, account_id) {
            return Ok(Some(account));
        }
    }
    Ok(None)
}

async fn exists(db: &SqlitePool, pool: Pool) -> Result<bool, ProxyError> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM credentials WHERE provider = ? AND refresh_token != ''",
    )
    .bind(pool.as_str())
    .fetch_one(db)
    .await?;
    Ok(n > 0)
}

fn ensure_parent_dir_private(database_url: &str) -> Result<(), ActorProcessingErr> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ActorProcessingErr::from(format!("create data dir failed: {e}")))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700))
                    .map_err(|e| ActorProcessingErr::from(format!("chmod data dir failed: {e}")))?;
            }
        }
    }
    Ok(())
}

/// Spawn the credential-store actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> CredentialActorHandle {
    let (actor, _jh) = Actor::spawn(
        Some("CredentialActor".to_string()),
        CredentialActor,
        database_url.to_string(),
    )
    .await
    .expect("failed to spawn CredentialActor");

    CredentialActorHandle { actor }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn actor() -> CredentialActorHandle {
        spawn("sqlite::memory:").await
    }

    fn creds(refresh: &str, expires_at: i64) -> Credentials {
        Credentials {
            access_token: Some("at".to_string()),
            refresh_token: refresh.to_string(),
            expires_at,
            project_id: None,
            email: Some("a@example.com".to_string()),
            account_id: Some("acct-1".to_string()),
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let h = actor().await;
        h.save(Pool::Codex, 0, creds("rt", 1000)).await.unwrap();
        let got = h.get(Pool::Codex, 0).await.unwrap().unwrap();
        assert_eq!(got.refresh_token, "rt");
        assert_eq!(got.expires_at, 1000);
    }

    #[tokio::test]
    async fn next_account_is_dense() {
        let h = actor().await;
        assert_eq!(h.next_account(Pool::Gemini).await.unwrap(), 0);
        h.save(Pool::Gemini, 0, creds("rt0", 1)).await.unwrap();
        assert_eq!(h.next_account(Pool::Gemini).await.unwrap(), 1);
        h.save(Pool::Gemini, 1, creds("rt1", 1)).await.unwrap();
        assert_eq!(h.next_account(Pool::Gemini).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn get_all_orders_by_account() {
        let h = actor().await;
        h.save(Pool::Antigravity, 1, creds("rt1", 1)).await.unwrap();
        h.save(Pool::Antigravity, 0, creds("rt0", 1)).await.unwrap();
        let all = h.get_all(Pool::Antigravity).await.unwrap();
        assert_eq!(all.iter().map(|(a, _)| *a).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[tokio::test]
    async fn find_by_identity_matches_email() {
        let h = actor().await;
        h.save(Pool::Gemini, 0, creds("rt", 1)).await.unwrap();
        let found = h
            .find_by_identity(Pool::Gemini, Some("a@example.com".to_string()), None)
            .await
            .unwrap();
        assert_eq!(found, Some(0));
    }

    #[tokio::test]
    async fn exists_false_without_refresh_token() {
        let h = actor().await;
        assert!(!h.exists(Pool::Codex).await.unwrap());
        h.save(Pool::Codex, 0, creds("rt", 1)).await.unwrap();
        assert!(h.exists(Pool::Codex).await.unwrap());
    }

    #[allow(unused)]
    fn unused_parse_pool_reference() {
        let _ = parse_pool("codex");
    }
}
