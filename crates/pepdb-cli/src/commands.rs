//! Subcommand dispatch.

use crate::Command;
use anyhow::{Context, Result};
use pepdb_core::{
    AnnotationFilter, CreateOptions, ForkOptions, PepAgent, Project, ProjectUpdateRequest,
    RegistryPath,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Run one subcommand and return what should be printed.
pub(crate) fn run(agent: &PepAgent, command: Command) -> Result<Value> {
    let output = match command {
        Command::Upload {
            file,
            namespace,
            name,
            tag,
            description,
            private,
            pop,
            schema,
            overwrite,
            update_only,
        } => {
            let project: Project = read_json(&file)?;
            let key = agent.project().create(
                project,
                &namespace,
                CreateOptions {
                    name,
                    tag,
                    description,
                    is_private: private,
                    pop,
                    schema,
                    overwrite,
                    update_only,
                },
            )?;
            info!("Uploaded {}", key);
            json!({ "registry_path": key.to_string() })
        }

        Command::Get {
            registry_path,
            with_ids,
        } => serde_json::to_value(
            agent
                .project()
                .get_by_registry_path(&registry_path, with_ids)?,
        )?,

        Command::Update {
            registry_path,
            request,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            let request: ProjectUpdateRequest = read_json(&request)?;
            serde_json::to_value(agent.project().update(&key, request)?)?
        }

        Command::Fork {
            registry_path,
            namespace,
            name,
            tag,
            private,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            let fork = agent.project().fork(
                &key,
                &namespace,
                ForkOptions {
                    name,
                    tag,
                    description: None,
                    is_private: private,
                },
            )?;
            json!({ "registry_path": fork.to_string(), "forked_from": key.to_string() })
        }

        Command::Delete { registry_path } => {
            agent.project().delete_by_registry_path(&registry_path)?;
            json!({ "deleted": registry_path })
        }

        Command::History { registry_path } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(agent.history().get_history(&key)?)?
        }

        Command::HistoryGet {
            registry_path,
            change_id,
            with_ids,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(
                agent
                    .history()
                    .get_project_from_history(&key, change_id, with_ids)?,
            )?
        }

        Command::Restore {
            registry_path,
            change_id,
            user,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(agent.history().restore(&key, change_id, user.as_deref())?)?
        }

        Command::HistoryDelete {
            registry_path,
            change_id,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            let removed = agent.history().delete_history(&key, change_id)?;
            json!({ "removed": removed })
        }

        Command::HistoryClean { days } => {
            let removed = agent.history().clean_history(days)?;
            json!({ "removed": removed })
        }

        Command::List {
            namespace,
            query,
            admin,
            limit,
            offset,
        } => serde_json::to_value(agent.annotation().get(&AnnotationFilter {
            namespace,
            query,
            admin,
            limit,
            offset,
            ..Default::default()
        })?)?,

        Command::Namespaces {
            query,
            admin,
            limit,
            offset,
        } => serde_json::to_value(
            agent
                .namespace()
                .list(query.as_deref(), &admin, limit, offset)?,
        )?,

        Command::ViewCreate {
            registry_path,
            view,
            samples,
            description,
            skip_missing,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(agent.view().create(
                &key,
                &view,
                &samples,
                &description,
                skip_missing,
            )?)?
        }

        Command::ViewGet {
            registry_path,
            view,
            with_ids,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(agent.view().get(&key, &view, with_ids)?)?
        }

        Command::Views { registry_path } => {
            let key = RegistryPath::parse(&registry_path)?;
            serde_json::to_value(agent.view().list(&key)?)?
        }

        Command::ViewDelete {
            registry_path,
            view,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            agent.view().delete(&key, &view)?;
            json!({ "deleted": view, "registry_path": key.to_string() })
        }

        Command::GroupCreate {
            namespace,
            name,
            description,
            private,
        } => serde_json::to_value(
            agent
                .group()
                .create(&namespace, &name, &description, private)?,
        )?,

        Command::GroupAdd {
            namespace,
            name,
            registry_path,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            agent.group().add_project(&namespace, &name, &key)?;
            serde_json::to_value(agent.group().get(&namespace, &name, &[namespace.clone()])?)?
        }

        Command::GroupRemove {
            namespace,
            name,
            registry_path,
        } => {
            let key = RegistryPath::parse(&registry_path)?;
            agent.group().remove_project(&namespace, &name, &key)?;
            serde_json::to_value(agent.group().get(&namespace, &name, &[namespace.clone()])?)?
        }

        Command::GroupGet {
            namespace,
            name,
            admin,
        } => {
            let group = agent.group().get(&namespace, &name, &admin)?;
            let projects: Vec<String> = agent
                .group()
                .projects(&namespace, &name, &admin)?
                .iter()
                .map(RegistryPath::to_string)
                .collect();
            json!({ "group": group, "projects": projects })
        }

        Command::Groups {
            namespace,
            query,
            admin,
            limit,
            offset,
        } => serde_json::to_value(agent.group().list(
            namespace.as_deref(),
            query.as_deref(),
            &admin,
            limit,
            offset,
        )?)?,

        Command::GroupDelete { namespace, name } => {
            agent.group().delete(&namespace, &name)?;
            json!({ "deleted": format!("{namespace}/{name}") })
        }
    };
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_json(value: &Value) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        file
    }

    #[test]
    fn test_upload_get_update_history() {
        let agent = PepAgent::in_memory().unwrap();
        let project = write_json(&json!({
            "_config": {"name": "cli"},
            "_sample_dict": [{"sample_name": "a"}, {"sample_name": "b"}]
        }));

        let uploaded = run(
            &agent,
            Command::Upload {
                file: project.path().to_path_buf(),
                namespace: "lab".into(),
                name: None,
                tag: None,
                description: None,
                private: false,
                pop: false,
                schema: None,
                overwrite: false,
                update_only: false,
            },
        )
        .unwrap();
        assert_eq!(uploaded["registry_path"], json!("lab/cli:default"));

        let fetched = run(
            &agent,
            Command::Get {
                registry_path: "lab/cli:default".into(),
                with_ids: true,
            },
        )
        .unwrap();
        let mut samples = fetched["_sample_dict"].as_array().unwrap().clone();
        samples.truncate(1);

        let request = write_json(&json!({ "samples": samples }));
        let outcome = run(
            &agent,
            Command::Update {
                registry_path: "lab/cli:default".into(),
                request: request.path().to_path_buf(),
            },
        )
        .unwrap();
        assert_eq!(outcome["deleted"], json!(1));
        assert_eq!(outcome["change_id"], json!(1));

        let history = run(
            &agent,
            Command::History {
                registry_path: "lab/cli:default".into(),
            },
        )
        .unwrap();
        assert_eq!(history["history"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_bad_registry_path_is_an_error() {
        let agent = PepAgent::in_memory().unwrap();
        let result = run(
            &agent,
            Command::Delete {
                registry_path: "no-slash".into(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_views_and_groups() {
        let agent = PepAgent::in_memory().unwrap();
        let project = write_json(&json!({
            "_config": {"name": "cli"},
            "_sample_dict": [{"sample_name": "a"}, {"sample_name": "b"}]
        }));
        run(
            &agent,
            Command::Upload {
                file: project.path().to_path_buf(),
                namespace: "lab".into(),
                name: None,
                tag: None,
                description: None,
                private: false,
                pop: false,
                schema: None,
                overwrite: false,
                update_only: false,
            },
        )
        .unwrap();

        let created = run(
            &agent,
            Command::ViewCreate {
                registry_path: "lab/cli:default".into(),
                view: "only-b".into(),
                samples: vec!["b".into()],
                description: String::new(),
                skip_missing: false,
            },
        )
        .unwrap();
        assert_eq!(created["number_of_samples"], json!(1));

        let view = run(
            &agent,
            Command::ViewGet {
                registry_path: "lab/cli:default".into(),
                view: "only-b".into(),
                with_ids: false,
            },
        )
        .unwrap();
        assert_eq!(view["_sample_dict"], json!([{"sample_name": "b"}]));

        run(
            &agent,
            Command::GroupCreate {
                namespace: "lab".into(),
                name: "favourites".into(),
                description: String::new(),
                private: true,
            },
        )
        .unwrap();
        let added = run(
            &agent,
            Command::GroupAdd {
                namespace: "lab".into(),
                name: "favourites".into(),
                registry_path: "lab/cli:default".into(),
            },
        )
        .unwrap();
        assert_eq!(added["number_of_projects"], json!(1));

        let group = run(
            &agent,
            Command::GroupGet {
                namespace: "lab".into(),
                name: "favourites".into(),
                admin: vec!["lab".into()],
            },
        )
        .unwrap();
        assert_eq!(group["projects"], json!(["lab/cli:default"]));
    }
}
