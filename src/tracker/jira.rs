use crate::domain::{NoteIssue, ReleaseScope, Version};
use crate::error::{ReleaseError, Result};
use crate::tracker::{IssueTracker, VersionInfo, NEXT_RELEASE};
use chrono::Local;
use log::debug;
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

const SCOPE_FIELD_NAME: &str = "Release number affected";
const MAX_ISSUES: u32 = 200;

/// Jira implementation of [IssueTracker].
///
/// Regular reads go through the core REST API. Version mutations go through
/// the "Version Manager" plugin REST endpoint, which exists so a release
/// captain without project-admin rights can edit versions; it only speaks
/// form-encoded requests.
pub struct JiraTracker {
    client: Client,
    base_url: String,
    token: String,
    project_key: String,
    locked: Option<LockedVersion>,
}

#[derive(Debug, Clone)]
struct LockedVersion {
    id: String,
    name: String,
    description: String,
}

#[derive(Deserialize)]
struct ProjectEntry {
    key: String,
    name: String,
}

#[derive(Deserialize)]
struct VersionEntry {
    id: String,
    name: String,
    #[serde(default)]
    released: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct SearchResult {
    issues: Vec<IssueEntry>,
}

#[derive(Deserialize)]
struct IssueEntry {
    key: String,
    fields: serde_json::Value,
}

#[derive(Deserialize)]
struct FieldEntry {
    id: String,
    name: String,
    #[serde(default)]
    custom: bool,
}

impl JiraTracker {
    /// Connect and resolve the project key from its name.
    ///
    /// An exact name match wins; otherwise a unique "starts with name plus a
    /// space" match is accepted, anything else is an error.
    pub fn new(base_url: &str, token: &str, project_name: &str) -> Result<Self> {
        let mut tracker = JiraTracker {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            project_key: String::new(),
            locked: None,
        };
        tracker.project_key = tracker.resolve_project_key(project_name)?;
        debug!("Jira project '{}' resolved to key {}", project_name, tracker.project_key);
        Ok(tracker)
    }

    fn resolve_project_key(&self, project_name: &str) -> Result<String> {
        let response = self.check(self.get("/rest/api/2/project"))?;
        let projects: Vec<ProjectEntry> = response.json()?;

        let prefix = format!("{} ", project_name);
        let mut prefix_matches = Vec::new();
        for project in projects {
            if project.name == project_name {
                return Ok(project.key);
            }
            if project.name.starts_with(&prefix) {
                prefix_matches.push(project.key);
            }
        }
        if prefix_matches.len() == 1 {
            return Ok(prefix_matches.remove(0));
        }
        Err(ReleaseError::integration(format!(
            "No project found with name {}",
            project_name
        )))
    }

    fn get(&self, path: &str) -> reqwest::Result<Response> {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .send()
    }

    fn put_json(&self, path: &str, body: &serde_json::Value) -> reqwest::Result<Response> {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .json(body)
            .send()
    }

    /// The plugin endpoint only accepts form-encoded bodies.
    fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Result<Response> {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .form(form)
            .send()
    }

    fn put_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Result<Response> {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .form(form)
            .send()
    }

    fn check(&self, result: reqwest::Result<Response>) -> Result<Response> {
        let response = result?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ReleaseError::integration(format!(
                "Jira rejected the token: {} {}",
                status, body
            )))
        } else if status.is_server_error() {
            Err(ReleaseError::transient(format!(
                "Jira server error: {} {}",
                status, body
            )))
        } else {
            Err(ReleaseError::integration(format!(
                "Jira request failed: {} {}",
                status, body
            )))
        }
    }

    fn version_manager_path(&self, version_id: Option<&str>) -> String {
        match version_id {
            Some(id) => format!(
                "/rest/versionmanager/1.0/versionmanager/{}/{}",
                self.project_key, id
            ),
            None => format!("/rest/versionmanager/1.0/versionmanager/{}", self.project_key),
        }
    }

    fn project_versions(&self) -> Result<Vec<VersionEntry>> {
        let response = self.check(self.get(&format!(
            "/rest/api/2/project/{}/versions",
            self.project_key
        )))?;
        Ok(response.json()?)
    }

    fn find_version(&self, name: &str) -> Result<Option<VersionEntry>> {
        Ok(self.project_versions()?.into_iter().find(|v| v.name == name))
    }

    fn locked(&self) -> Result<&LockedVersion> {
        self.locked
            .as_ref()
            .ok_or_else(|| ReleaseError::precondition("No version locked for this run"))
    }

    fn search(&self, jql: &str, fields: &str) -> Result<Vec<IssueEntry>> {
        let response = self.check(self.get(&format!(
            "/rest/api/2/search?jql={}&fields={}&maxResults={}",
            urlencode(jql),
            fields,
            MAX_ISSUES
        )))?;
        let result: SearchResult = response.json()?;
        Ok(result.issues)
    }

    fn check_all_tickets_resolved_or_closed(&self, version_name: &str) -> Result<()> {
        let jql = format!(
            "project = \"{}\" AND fixVersion = \"{}\" AND status NOT IN (\"Resolved\", \"Closed\")",
            self.project_key, version_name
        );
        let open = self.search(&jql, "status")?;
        if open.is_empty() {
            return Ok(());
        }
        let listing: Vec<String> = open
            .iter()
            .map(|issue| {
                let status = issue.fields["status"]["name"].as_str().unwrap_or("?");
                format!("- {} -> {}", issue.key, status)
            })
            .collect();
        Err(ReleaseError::precondition(format!(
            "The following tickets are not resolved or closed for Fix Version '{}':\n{}",
            version_name,
            listing.join("\n")
        )))
    }

    fn resolved_done_jql(&self, version_id: &str) -> String {
        format!(
            "project={} AND fixVersion={} AND status=Resolved AND resolution=Done",
            self.project_key, version_id
        )
    }

    fn scope_field_id(&self) -> Result<String> {
        let response = self.check(self.get("/rest/api/2/field"))?;
        let fields: Vec<FieldEntry> = response.json()?;
        fields
            .into_iter()
            .find(|f| f.custom && f.name == SCOPE_FIELD_NAME)
            .map(|f| f.id)
            .ok_or_else(|| {
                ReleaseError::integration(format!(
                    "Custom field '{}' not found",
                    SCOPE_FIELD_NAME
                ))
            })
    }

    fn highest_existing_version(&self) -> Result<Version> {
        let shape = Regex::new(r"^v(\d+)\.(\d+)\.(\d+)$").expect("version pattern is valid");
        let mut highest = Version::new(0, 0, 0);
        for entry in self.project_versions()? {
            if shape.is_match(&entry.name) {
                let version = Version::parse(&entry.name)?;
                highest = highest.max(version);
            }
        }
        Ok(highest)
    }

    fn release_scope(&self) -> Result<ReleaseScope> {
        let field_id = self.scope_field_id()?;
        let locked = self.locked()?;
        let issues = self.search(&self.resolved_done_jql(&locked.id), &field_id)?;

        let mut scope = ReleaseScope::Patch;
        for issue in issues {
            match issue.fields[&field_id]["value"].as_str() {
                Some("Major") => return Ok(ReleaseScope::Major),
                Some("Minor") => scope = ReleaseScope::Minor,
                _ => {}
            }
        }
        Ok(scope)
    }
}

/// Split the "used by" apps off a version description of the form
/// `"Version X.Y.Z - iOS A.B / Android C.D"`.
fn app_description(description: &str) -> String {
    match description.split_once(" - ") {
        Some((_, apps)) => apps.to_string(),
        None => String::new(),
    }
}

fn today() -> String {
    // YYYY-MM-DD, required by the version-manager REST API
    Local::now().format("%Y-%m-%d").to_string()
}

fn urlencode(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('+', "%2B")
        .replace('#', "%23")
        .replace(' ', "%20")
        .replace('"', "%22")
}

impl IssueTracker for JiraTracker {
    fn lock_version(&mut self, name: &str) -> Result<()> {
        let entry = self.find_version(name)?.ok_or_else(|| {
            ReleaseError::precondition(format!("Version {} not found in tracker", name))
        })?;
        if entry.released {
            return Err(ReleaseError::precondition(format!(
                "Version {} was already released",
                name
            )));
        }
        self.check_all_tickets_resolved_or_closed(&entry.name)?;
        self.locked = Some(LockedVersion {
            id: entry.id,
            name: entry.name,
            description: entry.description,
        });
        Ok(())
    }

    fn rename_and_close_current(&self, version: Version, apps: &str) -> Result<()> {
        let locked = self.locked()?;
        let date = today();
        let name = version.tag_name();
        let description = format!("Version {} - {}", version, apps);
        self.check(self.put_form(
            &self.version_manager_path(Some(&locked.id)),
            &[
                ("name", name.as_str()),
                ("startdate", date.as_str()),
                ("description", description.as_str()),
            ],
        ))?;
        Ok(())
    }

    fn create_placeholder_version(&self) -> Result<()> {
        self.check(self.post_form(
            &self.version_manager_path(None),
            &[("name", NEXT_RELEASE)],
        ))?;
        Ok(())
    }

    fn create_version_for_patch(&self, name: &str, apps: &str) -> Result<()> {
        let date = today();
        let description = format!("Version {} - {}", name, apps);
        self.check(self.post_form(
            &self.version_manager_path(None),
            &[
                ("name", name),
                ("releasedate", date.as_str()),
                ("description", description.as_str()),
            ],
        ))?;
        Ok(())
    }

    fn mark_released(&self) -> Result<()> {
        let locked = self.locked()?;
        let date = today();
        self.check(self.put_form(
            &self.version_manager_path(Some(&locked.id)),
            &[("releasedate", date.as_str()), ("status", "Released")],
        ))?;
        Ok(())
    }

    fn locked_app_description(&self) -> Result<String> {
        Ok(app_description(&self.locked()?.description))
    }

    fn version_info(&self, version: Version) -> Result<VersionInfo> {
        match self.project_versions()?
            .into_iter()
            .find(|v| v.name == version.tag_name())
        {
            None => Ok(VersionInfo {
                exists: false,
                released: false,
                app_description: String::new(),
            }),
            Some(entry) if entry.archived => Err(ReleaseError::precondition(format!(
                "Archived {} version already exists",
                version.tag_name()
            ))),
            Some(entry) => Ok(VersionInfo {
                exists: true,
                released: entry.released,
                app_description: app_description(&entry.description),
            }),
        }
    }

    fn unreleased_version_names(&self) -> Result<Vec<String>> {
        let shape = Regex::new(r"^v\d+\.\d+\.\d+$").expect("version pattern is valid");
        let current = self.locked.as_ref().map(|l| l.name.clone());
        Ok(self
            .project_versions()?
            .into_iter()
            .filter(|v| {
                !v.archived
                    && !v.released
                    && v.name != NEXT_RELEASE
                    && Some(&v.name) != current.as_ref()
                    && shape.is_match(&v.name)
            })
            .map(|v| v.name)
            .collect())
    }

    fn next_version(&self) -> Result<Version> {
        let highest = self.highest_existing_version()?;
        let scope = self.release_scope()?;
        Ok(highest.bump(scope))
    }

    fn add_fix_version(&self, tickets: &[String], version_name: &str) -> Result<()> {
        for ticket in tickets {
            let response = self.check(self.get(&format!(
                "/rest/api/2/issue/{}?fields=fixVersions",
                ticket
            )))?;
            let issue: IssueEntry = response.json()?;

            let mut fix_versions: Vec<serde_json::Value> = Vec::new();
            if let Some(existing) = issue.fields["fixVersions"].as_array() {
                for version in existing {
                    if version["name"].as_str() != Some(version_name) {
                        fix_versions.push(json!({ "name": version["name"] }));
                    }
                }
            }
            fix_versions.push(json!({ "name": version_name }));

            self.check(self.put_json(
                &format!("/rest/api/2/issue/{}", ticket),
                &json!({ "fields": { "fixVersions": fix_versions } }),
            ))?;
        }
        Ok(())
    }

    fn resolved_issues(&self) -> Result<Vec<NoteIssue>> {
        let locked = self.locked()?;
        let issues = self.search(&self.resolved_done_jql(&locked.id), "issuetype,summary")?;
        Ok(issues
            .into_iter()
            .map(|issue| NoteIssue {
                issue_type: issue.fields["issuetype"]["name"]
                    .as_str()
                    .unwrap_or("Other")
                    .to_string(),
                url: format!("{}/browse/{}", self.base_url, issue.key),
                summary: issue.fields["summary"].as_str().unwrap_or("").to_string(),
                key: issue.key,
            })
            .collect())
    }
}
