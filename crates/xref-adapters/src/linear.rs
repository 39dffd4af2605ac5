//! Linear GraphQL adapter: team lookup, cursor pagination of team issues and
//! single issue lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::debug;
use xref_core::{Attachment, Person, PrimaryRecord};
use xref_http::HttpClientConfig;

use crate::{split_identifier, Group, PrimaryTracker, RecordPage, TrackerError};

pub const DEFAULT_ENDPOINT: &str = "https://api.linear.app/graphql";
pub const DEFAULT_PAGE_SIZE: u32 = 200;
const TEAM_PAGE_SIZE: u32 = 250;

const ALL_TEAMS_QUERY: &str = "query($first: Int!, $cursor: String) {
    teams(first: $first, after: $cursor) {
        nodes { id name key }
        pageInfo { hasNextPage endCursor }
    }
}";

const ISSUE_FIELDS: &str = r#"
    id
    identifier
    title
    description
    state { name }
    attachments { nodes { title url } }
    labels { nodes { name } }
    createdAt
    updatedAt
    assignee { name email }
    creator { name email }
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TeamsData {
    teams: Nodes<TeamNode>,
}

#[derive(Debug, Deserialize)]
struct TeamListData {
    teams: TeamConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamConnection {
    nodes: Vec<TeamNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct TeamNode {
    id: String,
    name: String,
    key: String,
}

impl From<TeamNode> for Group {
    fn from(node: TeamNode) -> Self {
        Self {
            id: node.id,
            name: node.name,
            key: node.key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TeamIssuesData {
    team: Option<TeamIssues>,
}

#[derive(Debug, Deserialize)]
struct TeamIssues {
    issues: IssueConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueConnection {
    nodes: Vec<IssueNode>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

impl PageInfo {
    fn into_next_cursor(self) -> Result<Option<String>, TrackerError> {
        if !self.has_next_page {
            return Ok(None);
        }
        self.end_cursor
            .map(Some)
            .ok_or_else(|| TrackerError::Decode("hasNextPage is true but endCursor is missing".into()))
    }
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: Nodes<IssueNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNode {
    id: String,
    identifier: String,
    title: String,
    description: Option<String>,
    state: Option<StateNode>,
    attachments: Option<Nodes<AttachmentNode>>,
    labels: Option<Nodes<LabelNode>>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    assignee: Option<PersonNode>,
    creator: Option<PersonNode>,
}

#[derive(Debug, Deserialize)]
struct StateNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AttachmentNode {
    url: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PersonNode {
    name: String,
    email: Option<String>,
}

impl From<PersonNode> for Person {
    fn from(node: PersonNode) -> Self {
        Self {
            name: node.name,
            email: node.email,
        }
    }
}

impl From<IssueNode> for PrimaryRecord {
    fn from(node: IssueNode) -> Self {
        Self {
            id: node.id,
            identifier: node.identifier,
            title: node.title,
            status: node.state.map(|s| s.name).unwrap_or_default(),
            body: node.description.unwrap_or_default(),
            attachments: node
                .attachments
                .map(|a| a.nodes)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|a| {
                    Some(Attachment {
                        url: a.url?,
                        title: a.title,
                    })
                })
                .collect(),
            labels: node
                .labels
                .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
                .unwrap_or_default(),
            created_at: node.created_at,
            updated_at: node.updated_at,
            assignee: node.assignee.map(Into::into),
            creator: node.creator.map(Into::into),
        }
    }
}

fn page_from_connection(connection: IssueConnection) -> Result<RecordPage, TrackerError> {
    Ok(RecordPage {
        next_cursor: connection.page_info.into_next_cursor()?,
        records: connection.nodes.into_iter().map(Into::into).collect(),
    })
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, TrackerError> {
    let response: GraphQlResponse<T> =
        serde_json::from_slice(body).map_err(|e| TrackerError::Decode(e.to_string()))?;
    if !response.errors.is_empty() {
        let messages = response
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(TrackerError::GraphQl(messages));
    }
    response
        .data
        .ok_or_else(|| TrackerError::Decode("response has neither data nor errors".into()))
}

#[derive(Debug, Clone)]
pub struct LinearAdapter {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    page_size: u32,
}

impl LinearAdapter {
    pub fn new(
        token: impl Into<String>,
        endpoint: impl Into<String>,
        page_size: u32,
        http: &HttpClientConfig,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: xref_http::build_client(http)?,
            endpoint: endpoint.into(),
            token: token.into(),
            page_size: page_size.max(1),
        })
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: JsonValue,
    ) -> Result<T, TrackerError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TrackerError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        let body = resp.bytes().await?;
        decode(&body)
    }

    async fn teams(&self, query: &str, variables: JsonValue) -> Result<Vec<TeamNode>, TrackerError> {
        let data: TeamsData = self.query(query, variables).await?;
        Ok(data.teams.nodes)
    }

    /// Every team in the workspace, following the team list cursor.
    async fn all_teams(&self) -> Result<Vec<TeamNode>, TrackerError> {
        let mut teams = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data: TeamListData = self
                .query(
                    ALL_TEAMS_QUERY,
                    json!({ "first": TEAM_PAGE_SIZE, "cursor": cursor }),
                )
                .await?;
            teams.extend(data.teams.nodes);
            match data.teams.page_info.into_next_cursor()? {
                None => return Ok(teams),
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    return Err(TrackerError::Decode(format!(
                        "team list cursor {next:?} did not advance"
                    )));
                }
                Some(next) => cursor = Some(next),
            }
        }
    }
}

#[async_trait]
impl PrimaryTracker for LinearAdapter {
    async fn find_group(&self, identifier: &str) -> Result<Option<Group>, TrackerError> {
        let by_key = self
            .teams(
                "query($key: String!) { teams(filter: { key: { eq: $key } }) { nodes { id name key } } }",
                json!({ "key": identifier.to_uppercase() }),
            )
            .await?;
        if let Some(team) = by_key.into_iter().next() {
            return Ok(Some(team.into()));
        }

        let by_name = self
            .teams(
                "query($name: String!) { teams(filter: { name: { eq: $name } }) { nodes { id name key } } }",
                json!({ "name": identifier }),
            )
            .await?;
        if let Some(team) = by_name.into_iter().next() {
            return Ok(Some(team.into()));
        }

        let all = self.all_teams().await?;
        Ok(all
            .into_iter()
            .find(|team| team.name.eq_ignore_ascii_case(identifier))
            .map(Into::into))
    }

    async fn fetch_page(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage, TrackerError> {
        let query = format!(
            "query($teamId: String!, $first: Int!, $cursor: String) {{
                team(id: $teamId) {{
                    issues(first: $first, after: $cursor) {{
                        nodes {{ {ISSUE_FIELDS} }}
                        pageInfo {{ hasNextPage endCursor }}
                    }}
                }}
            }}"
        );
        let variables = json!({
            "teamId": group_id,
            "first": self.page_size,
            "cursor": cursor,
        });
        debug!(group_id, cursor, "fetching record page");
        let data: TeamIssuesData = self.query(&query, variables).await?;
        match data.team {
            Some(team) => page_from_connection(team.issues),
            None => Ok(RecordPage {
                records: Vec::new(),
                next_cursor: None,
            }),
        }
    }

    async fn fetch_record(&self, identifier: &str) -> Result<Option<PrimaryRecord>, TrackerError> {
        let (team_key, number) = split_identifier(identifier)?;
        let query = format!(
            "query($filter: IssueFilter!) {{ issues(filter: $filter) {{ nodes {{ {ISSUE_FIELDS} }} }} }}"
        );
        let variables = json!({
            "filter": {
                "number": { "eq": number },
                "team": { "key": { "eq": team_key } },
            }
        });
        let data: IssuesData = self.query(&query, variables).await?;
        Ok(data.issues.nodes.into_iter().next().map(Into::into))
    }
}
