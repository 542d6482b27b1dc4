//! Admin operations on accounts, streams, assignments and detector rules.
//!
//! Every mutation is validated here before it reaches a repository, and
//! mutations that change what the monitor sees publish a
//! [`ConfigUpdateEvent`] so the rule store and supervisor react without
//! waiting for their next periodic refresh.

use std::sync::Arc;

use tracing::{info, warn};

use super::dashboard::Dashboard;
use super::password::{hash_password, verify_password};
use crate::config::{ConfigEventBroadcaster, ConfigUpdateEvent};
use crate::database::models::{
    AssignmentDbModel, ChatKeywordDbModel, EventDbModel, FlaggedObjectDbModel, StreamDbModel,
    UserDbModel, UserRole,
};
use crate::database::DbPool;
use crate::database::repositories::{
    AssignmentRepository, EventRepository, RuleRepository, SqlxAssignmentRepository,
    SqlxEventRepository, SqlxRuleRepository, SqlxStreamRepository, SqlxUserRepository,
    StreamRepository, UserRepository,
};
use crate::database::time::days_ago_ms;
use crate::domain::StreamUrl;
use crate::{Error, Result};

/// Repositories the admin service works on.
#[derive(Clone)]
pub struct AdminRepositories {
    pub users: Arc<dyn UserRepository>,
    pub streams: Arc<dyn StreamRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub events: Arc<dyn EventRepository>,
    pub rules: Arc<dyn RuleRepository>,
}

impl AdminRepositories {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlx(pool: &DbPool) -> Self {
        Self {
            users: Arc::new(SqlxUserRepository::new(pool.clone())),
            streams: Arc::new(SqlxStreamRepository::new(pool.clone())),
            assignments: Arc::new(SqlxAssignmentRepository::new(pool.clone())),
            events: Arc::new(SqlxEventRepository::new(pool.clone())),
            rules: Arc::new(SqlxRuleRepository::new(pool.clone())),
        }
    }
}

pub struct AdminService {
    repos: AdminRepositories,
    config_events: ConfigEventBroadcaster,
}

/// Trimmed, or `None` when blank.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl AdminService {
    pub fn new(repos: AdminRepositories, config_events: ConfigEventBroadcaster) -> Self {
        Self {
            repos,
            config_events,
        }
    }

    fn publish(&self, event: ConfigUpdateEvent) {
        self.config_events.publish(event);
    }

    // ---------------------------------------------------------------------
    // Accounts
    // ---------------------------------------------------------------------

    /// Check credentials. Returns the user on success.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<UserDbModel>> {
        let Some(user) = self.repos.users.find_by_username(username.trim()).await? else {
            return Ok(None);
        };
        if verify_password(password, &user.password_hash)? {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Create the admin account unless one already exists. Returns whether it was created.
    pub async fn seed_admin(&self, username: &str, password: &str) -> Result<bool> {
        if self.repos.users.count_by_role(UserRole::Admin).await? > 0 {
            return Ok(false);
        }
        let user = UserDbModel::new(username, hash_password(password)?, UserRole::Admin);
        self.repos.users.create(&user).await?;
        info!(username, "Seeded admin account");
        Ok(true)
    }

    pub async fn list_agents(&self) -> Result<Vec<UserDbModel>> {
        self.repos.users.list_by_role(UserRole::Agent).await
    }

    pub async fn create_agent(&self, username: &str, password: &str) -> Result<UserDbModel> {
        let (Some(username), Some(password)) = (non_blank(Some(username)), non_blank(Some(password)))
        else {
            return Err(Error::validation("Username and password required"));
        };
        if self.repos.users.find_by_username(username).await?.is_some() {
            return Err(Error::duplicate("User", username));
        }

        let agent = UserDbModel::new(username, hash_password(password)?, UserRole::Agent);
        self.repos.users.create(&agent).await?;
        info!(agent_id = %agent.id, username, "Agent created");
        Ok(agent)
    }

    async fn find_agent(&self, agent_id: &str) -> Result<UserDbModel> {
        match self.repos.users.find_by_id(agent_id).await? {
            Some(user) if user.is_agent() => Ok(user),
            _ => Err(Error::not_found("Agent", agent_id)),
        }
    }

    /// Rename and/or change the password of an agent. Blank values are ignored.
    pub async fn update_agent(
        &self,
        agent_id: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> Result<UserDbModel> {
        let mut agent = self.find_agent(agent_id).await?;

        if let Some(username) = non_blank(username)
            && username != agent.username
        {
            if self.repos.users.find_by_username(username).await?.is_some() {
                return Err(Error::duplicate("User", username));
            }
            agent.username = username.to_string();
        }
        if let Some(password) = non_blank(password) {
            agent.password_hash = hash_password(password)?;
        }

        agent.touch();
        self.repos.users.update(&agent).await?;
        Ok(agent)
    }

    /// Delete an agent; its assignments go with it.
    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let agent = self.find_agent(agent_id).await?;
        self.repos.users.delete(&agent.id).await?;
        info!(agent_id, username = %agent.username, "Agent deleted");
        self.publish(ConfigUpdateEvent::AssignmentsUpdated);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Streams
    // ---------------------------------------------------------------------

    pub async fn list_streams(&self) -> Result<Vec<StreamDbModel>> {
        self.repos.streams.list().await
    }

    pub async fn create_stream(&self, url: &str) -> Result<StreamDbModel> {
        let Some(url) = non_blank(Some(url)) else {
            return Err(Error::validation("Stream URL required"));
        };
        let url = StreamUrl::new(url)?;
        if self.repos.streams.find_by_url(url.as_str()).await?.is_some() {
            return Err(Error::duplicate("Stream", url.as_str()));
        }

        let stream = StreamDbModel::new(&url);
        self.repos.streams.create(&stream).await?;
        info!(stream_id = %stream.id, url = %url, "Stream created");
        Ok(stream)
    }

    /// Edit a stream's display fields. The URL is its identity and never changes;
    /// blank values leave a field as it is.
    pub async fn update_stream(
        &self,
        stream_id: &str,
        platform: Option<&str>,
        streamer_username: Option<&str>,
    ) -> Result<StreamDbModel> {
        let mut stream = self
            .repos
            .streams
            .find_by_id(stream_id)
            .await?
            .ok_or_else(|| Error::not_found("Stream", stream_id))?;

        let platform = non_blank(platform);
        let streamer_username = non_blank(streamer_username);
        if platform.is_none() && streamer_username.is_none() {
            return Ok(stream);
        }

        stream.set_display(platform, streamer_username);
        self.repos.streams.update(&stream).await?;
        Ok(stream)
    }

    /// Delete a stream; its assignments go with it, past events stay.
    pub async fn delete_stream(&self, stream_id: &str) -> Result<()> {
        self.repos.streams.delete(stream_id).await?;
        info!(stream_id, "Stream deleted");
        self.publish(ConfigUpdateEvent::AssignmentsUpdated);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Assignments
    // ---------------------------------------------------------------------

    pub async fn assign(&self, agent_id: &str, stream_id: &str) -> Result<AssignmentDbModel> {
        let (Some(agent_id), Some(stream_id)) = (non_blank(Some(agent_id)), non_blank(Some(stream_id)))
        else {
            return Err(Error::validation("Agent and Stream are required"));
        };
        if self.repos.streams.find_by_id(stream_id).await?.is_none() {
            return Err(Error::not_found("Stream", stream_id));
        }
        self.find_agent(agent_id).await?;
        if self.repos.assignments.exists(agent_id, stream_id).await? {
            return Err(Error::duplicate(
                "Assignment",
                format!("{}/{}", agent_id, stream_id),
            ));
        }

        let assignment = AssignmentDbModel::new(agent_id, stream_id);
        self.repos.assignments.create(&assignment).await?;
        info!(agent_id, stream_id, "Stream assigned");
        self.publish(ConfigUpdateEvent::AssignmentsUpdated);
        Ok(assignment)
    }

    pub async fn unassign(&self, assignment_id: &str) -> Result<()> {
        self.repos.assignments.delete(assignment_id).await?;
        self.publish(ConfigUpdateEvent::AssignmentsUpdated);
        Ok(())
    }

    /// Every assignment with its stream and agent.
    pub async fn admin_dashboard(&self) -> Result<Dashboard> {
        let views = self.repos.assignments.list_views().await?;
        Ok(Dashboard::from_views(views, true))
    }

    /// Assignments of one agent.
    pub async fn agent_dashboard(&self, agent_id: &str) -> Result<Dashboard> {
        let views = self.repos.assignments.list_views_for_agent(agent_id).await?;
        Ok(Dashboard::from_views(views, false))
    }

    // ---------------------------------------------------------------------
    // Detector rules
    // ---------------------------------------------------------------------

    pub async fn list_keywords(&self) -> Result<Vec<ChatKeywordDbModel>> {
        self.repos.rules.list_keywords().await
    }

    pub async fn add_keyword(&self, keyword: &str) -> Result<ChatKeywordDbModel> {
        let Some(keyword) = non_blank(Some(keyword)) else {
            return Err(Error::validation("Keyword required"));
        };
        let model = ChatKeywordDbModel::new(keyword);
        self.repos.rules.create_keyword(&model).await?;
        self.publish(ConfigUpdateEvent::KeywordsUpdated);
        Ok(model)
    }

    /// A blank keyword leaves the row unchanged.
    pub async fn update_keyword(&self, id: &str, keyword: &str) -> Result<()> {
        if self.repos.rules.find_keyword(id).await?.is_none() {
            return Err(Error::not_found("Keyword", id));
        }
        if let Some(keyword) = non_blank(Some(keyword)) {
            self.repos.rules.update_keyword(id, keyword).await?;
            self.publish(ConfigUpdateEvent::KeywordsUpdated);
        }
        Ok(())
    }

    pub async fn delete_keyword(&self, id: &str) -> Result<()> {
        self.repos.rules.delete_keyword(id).await?;
        self.publish(ConfigUpdateEvent::KeywordsUpdated);
        Ok(())
    }

    pub async fn list_objects(&self) -> Result<Vec<FlaggedObjectDbModel>> {
        self.repos.rules.list_objects().await
    }

    pub async fn add_object(&self, object_name: &str) -> Result<FlaggedObjectDbModel> {
        let Some(object_name) = non_blank(Some(object_name)) else {
            return Err(Error::validation("Object name required"));
        };
        let model = FlaggedObjectDbModel::new(object_name);
        self.repos.rules.create_object(&model).await?;
        self.publish(ConfigUpdateEvent::ObjectsUpdated);
        Ok(model)
    }

    /// A blank name leaves the row unchanged.
    pub async fn update_object(&self, id: &str, object_name: &str) -> Result<()> {
        if self.repos.rules.find_object(id).await?.is_none() {
            return Err(Error::not_found("Object", id));
        }
        if let Some(object_name) = non_blank(Some(object_name)) {
            self.repos.rules.update_object(id, object_name).await?;
            self.publish(ConfigUpdateEvent::ObjectsUpdated);
        }
        Ok(())
    }

    pub async fn delete_object(&self, id: &str) -> Result<()> {
        self.repos.rules.delete_object(id).await?;
        self.publish(ConfigUpdateEvent::ObjectsUpdated);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub async fn recent_events(&self, limit: i64) -> Result<Vec<EventDbModel>> {
        self.repos.events.list_recent(limit).await
    }

    pub async fn stream_events(&self, url: &str, limit: i64) -> Result<Vec<EventDbModel>> {
        let url = StreamUrl::new(url)?;
        self.repos.events.list_for_stream(url.as_str(), limit).await
    }

    /// Delete events older than `days` days.
    pub async fn purge_events(&self, days: u32) -> Result<u64> {
        if days == 0 {
            return Err(Error::validation("Retention must be at least one day"));
        }
        let removed = self.repos.events.purge_older_than(days_ago_ms(days)).await?;
        if removed > 0 {
            warn!(removed, days, "Purged old events");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database;

    async fn setup() -> (AdminService, ConfigEventBroadcaster) {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        let repos = AdminRepositories::sqlx(&pool);
        let events = ConfigEventBroadcaster::new();
        (AdminService::new(repos, events.clone()), events)
    }

    #[tokio::test]
    async fn test_create_agent_validation() {
        let (admin, _) = setup().await;
        let err = admin.create_agent("  ", "pw").await.unwrap_err();
        assert!(matches!(err, Error::Validation(m) if m == "Username and password required"));

        admin.create_agent("alice", "pw").await.unwrap();
        let err = admin.create_agent(" alice ", "other").await.unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert_eq!(admin.list_agents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_authenticate_and_password_change() {
        let (admin, _) = setup().await;
        let agent = admin.create_agent("bob", "first").await.unwrap();
        assert_ne!(agent.password_hash, "first");
        assert!(admin.authenticate("bob", "first").await.unwrap().is_some());

        admin
            .update_agent(&agent.id, Some("  "), Some("second"))
            .await
            .unwrap();
        assert!(admin.authenticate("bob", "first").await.unwrap().is_none());
        assert!(admin.authenticate("bob", "second").await.unwrap().is_some());
        assert!(admin.authenticate("nobody", "second").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_admin_once() {
        let (admin, _) = setup().await;
        assert!(admin.seed_admin("admin", "admin").await.unwrap());
        assert!(!admin.seed_admin("admin", "other").await.unwrap());
        let user = admin.authenticate("admin", "admin").await.unwrap().unwrap();
        assert!(user.is_admin());
        // Admins are not agents.
        assert!(matches!(
            admin.delete_agent(&user.id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_validation_and_update() {
        let (admin, events) = setup().await;
        let mut rx = events.subscribe();

        assert!(matches!(
            admin.create_stream("").await.unwrap_err(),
            Error::Validation(m) if m == "Stream URL required"
        ));
        assert!(admin.create_stream("not a url").await.is_err());

        let stream = admin.create_stream("https://www.twitch.tv/someone").await.unwrap();
        assert!(matches!(
            admin.create_stream("https://www.twitch.tv/someone").await.unwrap_err(),
            Error::Duplicate { .. }
        ));

        let updated = admin
            .update_stream(&stream.id, None, Some("Someone Else"))
            .await
            .unwrap();
        assert_eq!(updated.platform, "Twitch");
        assert_eq!(updated.streamer_username, "Someone Else");
        assert_eq!(updated.room_url, stream.room_url);

        // Blank values are a no-op.
        let same = admin.update_stream(&stream.id, Some(" "), None).await.unwrap();
        assert_eq!(same.streamer_username, "Someone Else");

        // The URL identity is unchanged, so monitors need no reconcile.
        let stored = admin.list_streams().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].room_url, "https://www.twitch.tv/someone");
        assert_eq!(stored[0].streamer_username, "Someone Else");
        assert!(rx.try_recv().is_err());

        assert!(matches!(
            admin.update_stream("missing", None, Some("x")).await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_assign_rules() {
        let (admin, events) = setup().await;
        let mut rx = events.subscribe();
        let agent = admin.create_agent("carol", "pw").await.unwrap();
        let stream = admin.create_stream("https://chaturbate.com/room").await.unwrap();

        assert!(matches!(
            admin.assign("", &stream.id).await.unwrap_err(),
            Error::Validation(m) if m == "Agent and Stream are required"
        ));
        assert!(matches!(
            admin.assign(&agent.id, "missing").await.unwrap_err(),
            Error::NotFound { entity_type, .. } if entity_type == "Stream"
        ));

        admin.assign(&agent.id, &stream.id).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ConfigUpdateEvent::AssignmentsUpdated);
        assert!(matches!(
            admin.assign(&agent.id, &stream.id).await.unwrap_err(),
            Error::Duplicate { .. }
        ));

        let dashboard = admin.admin_dashboard().await.unwrap();
        assert_eq!(dashboard.ongoing_streams, 1);
        assert_eq!(dashboard.assignments.len(), 1);
        assert_eq!(dashboard.assignments[0].agent_username.as_deref(), Some("carol"));

        let mine = admin.agent_dashboard(&agent.id).await.unwrap();
        assert_eq!(mine.assignments[0].stream_url, "https://chaturbate.com/room");

        admin.unassign(&dashboard.assignments[0].assignment_id).await.unwrap();
        assert_eq!(admin.admin_dashboard().await.unwrap().ongoing_streams, 0);
    }

    #[tokio::test]
    async fn test_rule_mutations_publish_events() {
        let (admin, events) = setup().await;
        let mut rx = events.subscribe();

        assert!(matches!(
            admin.add_keyword(" ").await.unwrap_err(),
            Error::Validation(m) if m == "Keyword required"
        ));
        let kw = admin.add_keyword("gun").await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ConfigUpdateEvent::KeywordsUpdated);
        assert!(admin.add_keyword("gun").await.unwrap_err().is_unique_violation());

        admin.update_keyword(&kw.id, "rifle").await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ConfigUpdateEvent::KeywordsUpdated);
        assert!(matches!(
            admin.update_keyword("missing", "x").await.unwrap_err(),
            Error::NotFound { .. }
        ));

        let obj = admin.add_object("knife").await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ConfigUpdateEvent::ObjectsUpdated);
        admin.delete_object(&obj.id).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), ConfigUpdateEvent::ObjectsUpdated);
        assert!(admin.list_objects().await.unwrap().is_empty());
        assert_eq!(admin.list_keywords().await.unwrap()[0].keyword, "rifle");
    }

    #[tokio::test]
    async fn test_purge_requires_positive_days() {
        let (admin, _) = setup().await;
        assert!(admin.purge_events(0).await.is_err());
        assert_eq!(admin.purge_events(30).await.unwrap(), 0);
    }
}
