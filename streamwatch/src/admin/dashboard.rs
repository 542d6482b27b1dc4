//! Dashboard views built from assignment joins.

use std::collections::HashSet;

use serde::Serialize;

use crate::database::models::AssignmentView;

/// Placeholder thumbnail for a stream card.
pub fn preview_url(stream_id: &str) -> String {
    format!("https://via.placeholder.com/150?text=Stream+{}", stream_id)
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    pub assignment_id: String,
    pub stream_id: String,
    pub stream_url: String,
    pub platform: String,
    pub streamer_username: String,
    pub preview_url: String,
    /// Present on the admin dashboard only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    /// Distinct streams among the listed assignments.
    pub ongoing_streams: usize,
    pub assignments: Vec<DashboardEntry>,
}

impl Dashboard {
    /// Build a dashboard; `with_agent` includes the agent columns.
    pub fn from_views(views: Vec<AssignmentView>, with_agent: bool) -> Self {
        let ongoing_streams = views
            .iter()
            .map(|v| v.stream_id.as_str())
            .collect::<HashSet<_>>()
            .len();

        let assignments = views
            .into_iter()
            .map(|v| DashboardEntry {
                preview_url: preview_url(&v.stream_id),
                assignment_id: v.assignment_id,
                stream_id: v.stream_id,
                stream_url: v.room_url,
                platform: v.platform,
                streamer_username: v.streamer_username,
                agent_id: with_agent.then_some(v.agent_id),
                agent_username: with_agent.then_some(v.agent_username),
            })
            .collect();

        Self {
            ongoing_streams,
            assignments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(assignment: &str, stream: &str, agent: &str) -> AssignmentView {
        AssignmentView {
            assignment_id: assignment.to_string(),
            stream_id: stream.to_string(),
            room_url: format!("https://twitch.tv/{}", stream),
            platform: "Twitch".to_string(),
            streamer_username: stream.to_string(),
            agent_id: agent.to_string(),
            agent_username: format!("agent-{}", agent),
            created_at: 0,
        }
    }

    #[test]
    fn test_ongoing_streams_counts_distinct_streams() {
        let dashboard = Dashboard::from_views(
            vec![view("1", "s1", "a"), view("2", "s1", "b"), view("3", "s2", "a")],
            true,
        );
        assert_eq!(dashboard.ongoing_streams, 2);
        assert_eq!(dashboard.assignments.len(), 3);
        assert_eq!(
            dashboard.assignments[0].preview_url,
            "https://via.placeholder.com/150?text=Stream+s1"
        );
        assert_eq!(dashboard.assignments[1].agent_username.as_deref(), Some("agent-b"));
    }

    #[test]
    fn test_agent_view_omits_agent_columns() {
        let dashboard = Dashboard::from_views(vec![view("1", "s1", "a")], false);
        let json = serde_json::to_value(&dashboard).unwrap();
        assert!(json["assignments"][0].get("agent_id").is_none());
        assert_eq!(json["assignments"][0]["stream_url"], "https://twitch.tv/s1");
    }
}
