//! git2-backed delivery adapter.
//!
//! Clones the category's repository into a scratch directory, renders the
//! manifest, commits it, and pushes: straight to the default branch for
//! `direct`, or to a job-derived `gitops/<job_id>` branch for
//! `pull_request` (PR creation itself happens out-of-band). Delivery is
//! idempotent per (job_id, destination path): if the rendered content is
//! already at the branch head, the existing reference is returned without a
//! new commit.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Commit, Cred, FetchOptions, PushOptions, RemoteCallbacks, Repository, Signature};
use tracing::{debug, info};

use crate::error::JobError;
use crate::external::{DeliveryRequest, GitDelivery};
use crate::jobs::DeliveryRef;

use super::merge_strategy::MergeStrategy;
use super::template::TemplateEngine;

/// Identity and credentials used for commits and pushes.
#[derive(Debug, Clone)]
pub struct GitAuth {
    pub username: String,
    pub email: String,
    pub token: Option<String>,
}

impl Default for GitAuth {
    fn default() -> Self {
        Self {
            username: "provisio".to_string(),
            email: "provisio@localhost".to_string(),
            token: None,
        }
    }
}

#[derive(Clone)]
pub struct Git2Delivery {
    /// Category (or category group) → clone URL.
    repos: HashMap<String, String>,
    auth: GitAuth,
    engine: Arc<dyn TemplateEngine>,
}

impl Git2Delivery {
    pub fn new(
        repos: HashMap<String, String>,
        auth: GitAuth,
        engine: Arc<dyn TemplateEngine>,
    ) -> Self {
        Self { repos, auth, engine }
    }

    /// Exact category entries win over their group entry, mirroring the
    /// repo-map convention of the operator configuration.
    fn repo_url(&self, category: &str) -> Result<String, JobError> {
        let group = category.split('/').next().unwrap_or(category);
        self.repos
            .get(category)
            .or_else(|| self.repos.get(group))
            .cloned()
            .ok_or_else(|| {
                JobError::Delivery(format!("no repository configured for category '{category}'"))
            })
    }

    fn callbacks(&self) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        let username = self.auth.username.clone();
        let token = self.auth.token.clone();
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            let user = username_from_url.unwrap_or(&username);
            match &token {
                Some(token) => Cred::userpass_plaintext(user, token),
                None => Cred::default(),
            }
        });
        callbacks
    }

    fn deliver_blocking(&self, request: DeliveryRequest) -> Result<DeliveryRef, JobError> {
        let url = self.repo_url(&request.category)?;
        let manifest = self.engine.render(&request.template_id, &request.context)?;

        let workdir = tempfile::tempdir()
            .map_err(|err| JobError::Delivery(format!("scratch directory failed: {err}")))?;

        debug!(url = %url, path = %request.destination_path, "cloning delivery repository");
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(self.callbacks());
        let repo = RepoBuilder::new()
            .fetch_options(fetch)
            .clone(&url, workdir.path())
            .map_err(|err| git_error("clone", &err))?;

        let head = head_commit(&repo);
        let base_branch = repo
            .head()
            .ok()
            .and_then(|h| h.shorthand().map(str::to_string))
            .unwrap_or_else(|| "main".to_string());

        let target_branch = match request.merge_strategy {
            MergeStrategy::Direct => base_branch,
            MergeStrategy::PullRequest => format!("gitops/{}", request.job_id),
        };

        if let (MergeStrategy::PullRequest, Some(base)) = (request.merge_strategy, head.as_ref()) {
            repo.branch(&target_branch, base, true)
                .map_err(|err| git_error("branch", &err))?;
            repo.set_head(&format!("refs/heads/{target_branch}"))
                .map_err(|err| git_error("set-head", &err))?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))
                .map_err(|err| git_error("checkout", &err))?;
        }

        let full_path = workdir.path().join(&request.destination_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| JobError::Delivery(format!("creating {parent:?} failed: {err}")))?;
        }
        std::fs::write(&full_path, &manifest)
            .map_err(|err| JobError::Delivery(format!("writing manifest failed: {err}")))?;

        let mut index = repo.index().map_err(|err| git_error("index", &err))?;
        index
            .add_path(Path::new(&request.destination_path))
            .map_err(|err| git_error("stage", &err))?;
        index.write().map_err(|err| git_error("stage", &err))?;
        let tree_id = index.write_tree().map_err(|err| git_error("tree", &err))?;

        // Identical content already at the branch head: nothing to deliver.
        if let Some(base) = head.as_ref() {
            if base.tree_id() == tree_id {
                info!(
                    job_id = %request.job_id,
                    path = %request.destination_path,
                    "content already delivered, returning existing reference"
                );
                return Ok(match request.merge_strategy {
                    MergeStrategy::Direct => DeliveryRef::Commit(base.id().to_string()),
                    MergeStrategy::PullRequest => DeliveryRef::Branch(target_branch),
                });
            }
        }

        let tree = repo.find_tree(tree_id).map_err(|err| git_error("tree", &err))?;
        let signature = Signature::now(&self.auth.username, &self.auth.email)
            .map_err(|err| git_error("signature", &err))?;
        let message = commit_message(&request);
        let parents: Vec<&Commit> = head.iter().collect();
        let update_ref = format!("refs/heads/{target_branch}");
        let commit_id = repo
            .commit(Some(&update_ref), &signature, &signature, &message, &tree, &parents)
            .map_err(|err| git_error("commit", &err))?;

        // Review branches are force-updated: re-delivery for the same job
        // must be able to replace its own earlier branch tip.
        let refspec = match request.merge_strategy {
            MergeStrategy::Direct => format!("refs/heads/{target_branch}:refs/heads/{target_branch}"),
            MergeStrategy::PullRequest => {
                format!("+refs/heads/{target_branch}:refs/heads/{target_branch}")
            }
        };
        let mut remote = repo
            .find_remote("origin")
            .map_err(|err| git_error("remote", &err))?;
        let mut push = PushOptions::new();
        push.remote_callbacks(self.callbacks());
        remote
            .push(&[refspec.as_str()], Some(&mut push))
            .map_err(|err| git_error("push", &err))?;

        info!(
            job_id = %request.job_id,
            branch = %target_branch,
            commit = %commit_id,
            "delivered configuration"
        );
        Ok(match request.merge_strategy {
            MergeStrategy::Direct => DeliveryRef::Commit(commit_id.to_string()),
            MergeStrategy::PullRequest => DeliveryRef::Branch(target_branch),
        })
    }
}

#[async_trait]
impl GitDelivery for Git2Delivery {
    async fn render_and_deliver(&self, request: DeliveryRequest) -> Result<DeliveryRef, JobError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.deliver_blocking(request))
            .await
            .map_err(|err| JobError::Delivery(format!("delivery task failed: {err}")))?
    }
}

/// HEAD commit, or `None` for a freshly initialized (unborn) repository.
fn head_commit(repo: &Repository) -> Option<Commit<'_>> {
    repo.head().ok().and_then(|h| h.peel_to_commit().ok())
}

fn commit_message(request: &DeliveryRequest) -> String {
    format!(
        "Update {}\n\nTemplate: {}\nResource category: {}\nJob: {}\n",
        request.destination_path, request.template_id, request.category, request.job_id
    )
}

fn git_error(operation: &str, err: &git2::Error) -> JobError {
    JobError::Delivery(format!("git {operation} failed: {}", err.message()))
}
