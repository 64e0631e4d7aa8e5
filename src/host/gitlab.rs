use crate::error::{ReleaseError, Result};
use crate::host::{
    MergeRequestHandle, MergeRequestSpec, MergeRequestState, MergeRequestStatus,
    SourceRepositoryHost,
};
use log::{debug, warn};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

const RELEASE_LABEL: &str = "Release";

/// GitLab v4 REST implementation of [SourceRepositoryHost].
///
/// Construction authenticates the token, resolves the project by name
/// (restricted to group namespaces, since project names are only unique per
/// namespace kind here) and makes sure the "Release" label exists.
pub struct GitLabHost {
    client: Client,
    api_base: String,
    token: String,
    project_id: u64,
    ssh_url: String,
}

#[derive(Deserialize)]
struct ProjectInfo {
    id: u64,
    name: String,
    namespace: NamespaceInfo,
    ssh_url_to_repo: String,
}

#[derive(Deserialize)]
struct NamespaceInfo {
    kind: String,
}

#[derive(Deserialize)]
struct MrInfo {
    iid: u64,
    title: String,
    web_url: String,
    state: String,
    #[serde(default)]
    merge_status: String,
    #[serde(default)]
    detailed_merge_status: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
    #[serde(default)]
    has_conflicts: bool,
}

#[derive(Deserialize)]
struct TagInfo {
    name: String,
    target: String,
    commit: CommitInfo,
}

#[derive(Deserialize)]
struct CommitInfo {
    id: String,
    #[serde(default)]
    web_url: String,
}

#[derive(Deserialize)]
struct LabelInfo {
    name: String,
}

impl GitLabHost {
    /// Connect to a GitLab instance and resolve the project.
    ///
    /// # Arguments
    /// * `host_url` - Base URL of the instance (e.g. "https://gitlab.example.com")
    /// * `token` - Private token with api scope
    /// * `project_name` - Exact project name within a group namespace
    pub fn new(host_url: &str, token: &str, project_name: &str) -> Result<Self> {
        let client = Client::new();
        let api_base = format!("{}/api/v4", host_url.trim_end_matches('/'));

        let mut host = GitLabHost {
            client,
            api_base,
            token: token.to_string(),
            project_id: 0,
            ssh_url: String::new(),
        };

        // token check up front so a bad token fails before any workflow step
        host.check(host.get("/user"))?;

        let project = host.resolve_project(project_name)?;
        host.project_id = project.id;
        host.ssh_url = project.ssh_url_to_repo;

        host.ensure_release_label()?;
        debug!("GitLab project '{}' resolved to id {}", project_name, host.project_id);
        Ok(host)
    }

    fn resolve_project(&self, project_name: &str) -> Result<ProjectInfo> {
        let response = self.check(self.get(&format!(
            "/projects?search={}&simple=false",
            encode(project_name)
        )))?;
        let candidates: Vec<ProjectInfo> = response.json()?;

        // Several projects can share a name across namespaces; the release
        // project lives in a group namespace.
        let mut matches: Vec<ProjectInfo> = candidates
            .into_iter()
            .filter(|p| p.name == project_name && p.namespace.kind == "group")
            .collect();
        if matches.len() != 1 {
            return Err(ReleaseError::integration(format!(
                "{} projects found with name {}",
                matches.len(),
                project_name
            )));
        }
        Ok(matches.remove(0))
    }

    fn ensure_release_label(&self) -> Result<()> {
        let response = self.check(self.get(&self.project_path("/labels")))?;
        let labels: Vec<LabelInfo> = response.json()?;
        if labels.iter().any(|l| l.name == RELEASE_LABEL) {
            return Ok(());
        }
        warn!("Label {} did not exist, creating it", RELEASE_LABEL);
        self.check(self.post(
            &self.project_path("/labels"),
            &json!({ "name": RELEASE_LABEL, "color": "#8899aa" }),
        ))?;
        Ok(())
    }

    fn project_path(&self, suffix: &str) -> String {
        format!("/projects/{}{}", self.project_id, suffix)
    }

    fn get(&self, path: &str) -> reqwest::Result<Response> {
        self.client
            .get(format!("{}{}", self.api_base, path))
            .header("PRIVATE-TOKEN", &self.token)
            .send()
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Result<Response> {
        self.client
            .post(format!("{}{}", self.api_base, path))
            .header("PRIVATE-TOKEN", &self.token)
            .json(body)
            .send()
    }

    fn put(&self, path: &str, body: &serde_json::Value) -> reqwest::Result<Response> {
        self.client
            .put(format!("{}{}", self.api_base, path))
            .header("PRIVATE-TOKEN", &self.token)
            .json(body)
            .send()
    }

    fn delete(&self, path: &str) -> reqwest::Result<Response> {
        self.client
            .delete(format!("{}{}", self.api_base, path))
            .header("PRIVATE-TOKEN", &self.token)
            .send()
    }

    /// Map transport and HTTP-status failures onto the error taxonomy.
    fn check(&self, result: reqwest::Result<Response>) -> Result<Response> {
        let response = result?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ReleaseError::integration(format!(
                "GitLab rejected the token: {} {}",
                status, body
            )))
        } else if status.is_server_error() {
            Err(ReleaseError::transient(format!(
                "GitLab server error: {} {}",
                status, body
            )))
        } else {
            Err(ReleaseError::integration(format!(
                "GitLab request failed: {} {}",
                status, body
            )))
        }
    }

    fn all_tags(&self) -> Result<Vec<TagInfo>> {
        let mut tags = Vec::new();
        let mut page = 1;
        loop {
            let response = self.check(self.get(&self.project_path(&format!(
                "/repository/tags?per_page=100&page={}",
                page
            ))))?;
            let chunk: Vec<TagInfo> = response.json()?;
            let done = chunk.len() < 100;
            tags.extend(chunk);
            if done {
                return Ok(tags);
            }
            page += 1;
        }
    }

    fn mr_info(&self, id: u64) -> Result<MrInfo> {
        let response = self.check(self.get(&self.project_path(&format!("/merge_requests/{}", id))))?;
        Ok(response.json()?)
    }
}

impl SourceRepositoryHost for GitLabHost {
    fn create_branch(&self, name: &str, target: &str) -> Result<()> {
        self.check(self.post(
            &self.project_path("/repository/branches"),
            &json!({ "branch": name, "ref": target }),
        ))?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.check(self.delete(&self.project_path(&format!(
            "/repository/branches/{}",
            encode(name)
        ))))?;
        Ok(())
    }

    fn create_tag(&self, name: &str, target: &str) -> Result<()> {
        self.check(self.post(
            &self.project_path("/repository/tags"),
            &json!({ "tag_name": name, "ref": target }),
        ))?;
        Ok(())
    }

    fn delete_tag(&self, name: &str) -> Result<()> {
        self.check(self.delete(&self.project_path(&format!(
            "/repository/tags/{}",
            encode(name)
        ))))?;
        Ok(())
    }

    fn last_commit(&self, branch: &str) -> Result<String> {
        let response = self.check(self.get(&self.project_path(&format!(
            "/repository/commits?ref_name={}&per_page=1",
            encode(branch)
        ))))?;
        let commits: Vec<CommitInfo> = response.json()?;
        commits
            .into_iter()
            .next()
            .map(|c| c.id)
            .ok_or_else(|| ReleaseError::integration(format!("No commits found on {}", branch)))
    }

    fn last_rc_number(&self, release_tag: &str) -> Result<u32> {
        let names: Vec<String> = self.all_tags()?.into_iter().map(|t| t.name).collect();
        crate::domain::last_rc_number(&names, release_tag)
    }

    fn find_open_mr(
        &self,
        title: &str,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<Option<MergeRequestHandle>> {
        let response = self.check(self.get(&self.project_path(&format!(
            "/merge_requests?state=opened&source_branch={}&target_branch={}",
            encode(source_branch),
            encode(target_branch)
        ))))?;
        let mrs: Vec<MrInfo> = response.json()?;
        Ok(mrs.into_iter().find(|mr| mr.title == title).map(|mr| {
            MergeRequestHandle {
                id: mr.iid,
                url: mr.web_url,
            }
        }))
    }

    fn open_mr(&self, spec: &MergeRequestSpec) -> Result<Option<MergeRequestHandle>> {
        if let Some(existing) =
            self.find_open_mr(&spec.title, &spec.source_branch, &spec.target_branch)?
        {
            warn!(
                "MR with title \"{}\" was already opened: {}",
                spec.title, existing.url
            );
            return Ok(None);
        }

        let mut body = json!({
            "title": spec.title,
            "source_branch": spec.source_branch,
            "target_branch": spec.target_branch,
            "remove_source_branch": spec.remove_source,
            "squash": spec.squash,
            "subscribed": true,
        });
        if let Some(label) = &spec.label {
            body["labels"] = json!(label);
        }

        let response = self.check(self.post(&self.project_path("/merge_requests"), &body))?;
        let mr: MrInfo = response.json()?;
        Ok(Some(MergeRequestHandle {
            id: mr.iid,
            url: mr.web_url,
        }))
    }

    fn mr_status(&self, id: u64) -> Result<MergeRequestStatus> {
        Ok(status_from(self.mr_info(id)?))
    }

    fn merge_mr(&self, id: u64) -> Result<()> {
        self.check(self.put(
            &self.project_path(&format!("/merge_requests/{}/merge", id)),
            &json!({}),
        ))?;
        Ok(())
    }

    fn close_mr(&self, id: u64) -> Result<()> {
        self.check(self.put(
            &self.project_path(&format!("/merge_requests/{}", id)),
            &json!({ "state_event": "close" }),
        ))?;
        Ok(())
    }

    fn create_release(&self, name: &str, tag: &str, notes: &str) -> Result<()> {
        self.check(self.post(
            &self.project_path("/releases"),
            &json!({ "name": name, "tag_name": tag, "description": notes }),
        ))?;
        Ok(())
    }

    fn tag_url(&self, tag: &str) -> Result<String> {
        let response = self.check(self.get(&self.project_path(&format!(
            "/repository/tags/{}",
            encode(tag)
        ))))?;
        let info: TagInfo = response.json()?;
        // the commit URL points at the tagged commit; rewrite it to the
        // commit list of the tag itself
        Ok(info.commit.web_url.replace(
            &format!("/commit/{}", info.target),
            &format!("/commits/{}", info.name),
        ))
    }

    fn repo_url(&self) -> Result<String> {
        Ok(self.ssh_url.clone())
    }
}

fn status_from(mr: MrInfo) -> MergeRequestStatus {
    let state = match mr.state.as_str() {
        "opened" => MergeRequestState::Opened,
        "merged" => MergeRequestState::Merged,
        "locked" => MergeRequestState::Locked,
        _ => MergeRequestState::Closed,
    };
    MergeRequestStatus {
        state,
        mergeable: mergeable_from(&mr.merge_status, &mr.detailed_merge_status),
        draft: mr.draft,
        work_in_progress: mr.work_in_progress,
        has_conflicts: mr.has_conflicts,
        url: mr.web_url,
    }
}

/// `merge_status` only tracks conflicts; the approval state lives in
/// `detailed_merge_status`, so both must agree before a merge. Older
/// instances omit the detailed field entirely.
fn mergeable_from(merge_status: &str, detailed_merge_status: &str) -> bool {
    merge_status == "can_be_merged"
        && (detailed_merge_status.is_empty() || detailed_merge_status == "mergeable")
}

/// Percent-encode a value used as a path segment or query value.
///
/// Branch and tag names contain `/` and `.`; only the characters GitLab
/// actually requires escaping for are handled.
fn encode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('/', "%2F")
        .replace('&', "%26")
        .replace('+', "%2B")
        .replace(' ', "%20")
        .replace('#', "%23")
        .replace('?', "%3F")
}
