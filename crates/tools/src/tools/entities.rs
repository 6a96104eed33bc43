//! Activity, project and customer tools.
//!
//! All three share Kimai's `/api/{entity}s` resource layout, so one set of handlers
//! parameterized by [`EntityKind`] serves them all.

use super::{positive_id, require_positive_id, to_payload, visibility_filter};
use crate::client::{KimaiClient, QueryParams};
use crate::error::{Result, ToolError};
use crate::normalize::{EntityKind, normalize_entity, normalize_list};
use crate::registry::{ParamSpec, ParamType, ToolArgs, ToolDefinition, ToolHandler, ToolRegistry};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Map, Value, json};

struct ToolText {
    name: &'static str,
    title: &'static str,
    description: &'static str,
}

/// The tools exposed for one entity type. Customers are list-only.
struct EntityTools {
    kind: EntityKind,
    parent_description: &'static str,
    parent_required_on_create: bool,
    list: ToolText,
    get: Option<ToolText>,
    create: Option<ToolText>,
    update: Option<ToolText>,
    set_meta: Option<ToolText>,
}

const ACTIVITIES: EntityTools = EntityTools {
    kind: EntityKind::Activity,
    parent_description: "Project id the activity belongs to",
    parent_required_on_create: false,
    list: ToolText {
        name: "kimai_list_activities",
        title: "List activities",
        description: "List Kimai activities, optionally filtered by search term, project and visibility.",
    },
    get: Some(ToolText {
        name: "kimai_get_activity",
        title: "Get activity",
        description: "Fetch one Kimai activity by id.",
    }),
    create: Some(ToolText {
        name: "kimai_create_activity",
        title: "Create activity",
        description: "Create a Kimai activity. Without a project the activity is global.",
    }),
    update: Some(ToolText {
        name: "kimai_update_activity",
        title: "Update activity",
        description: "Update a Kimai activity. Only the supplied fields are changed.",
    }),
    set_meta: Some(ToolText {
        name: "kimai_set_activity_meta",
        title: "Set activity meta field",
        description: "Set one custom meta field on a Kimai activity. The field must be configured in Kimai.",
    }),
};

const PROJECTS: EntityTools = EntityTools {
    kind: EntityKind::Project,
    parent_description: "Customer id the project belongs to",
    parent_required_on_create: true,
    list: ToolText {
        name: "kimai_list_projects",
        title: "List projects",
        description: "List Kimai projects, optionally filtered by search term, customer and visibility.",
    },
    get: Some(ToolText {
        name: "kimai_get_project",
        title: "Get project",
        description: "Fetch one Kimai project by id.",
    }),
    create: Some(ToolText {
        name: "kimai_create_project",
        title: "Create project",
        description: "Create a Kimai project for a customer.",
    }),
    update: Some(ToolText {
        name: "kimai_update_project",
        title: "Update project",
        description: "Update a Kimai project. Only the supplied fields are changed.",
    }),
    set_meta: Some(ToolText {
        name: "kimai_set_project_meta",
        title: "Set project meta field",
        description: "Set one custom meta field on a Kimai project. The field must be configured in Kimai.",
    }),
};

const CUSTOMERS: EntityTools = EntityTools {
    kind: EntityKind::Customer,
    parent_description: "",
    parent_required_on_create: false,
    list: ToolText {
        name: "kimai_list_customers",
        title: "List customers",
        description: "List Kimai customers, optionally filtered by search term and visibility.",
    },
    get: None,
    create: None,
    update: None,
    set_meta: None,
};

pub(super) fn register(registry: &mut ToolRegistry) -> Result<()> {
    for tools in [ACTIVITIES, PROJECTS, CUSTOMERS] {
        register_entity(registry, &tools)?;
    }
    Ok(())
}

fn register_entity(registry: &mut ToolRegistry, tools: &EntityTools) -> Result<()> {
    let kind = tools.kind;
    let parent = kind.parent_field();
    let id_param = || ParamSpec::required("id", ParamType::Integer, "Record id");

    let mut list_params = vec![ParamSpec::optional(
        "term",
        ParamType::String,
        "Free-text search term",
    )];
    if let Some(parent) = parent {
        list_params.push(ParamSpec::optional(
            parent,
            ParamType::Integer,
            tools.parent_description,
        ));
    }
    list_params.push(ParamSpec::optional(
        "visible",
        ParamType::Boolean,
        "true for visible records only, false for hidden records only",
    ));
    registry.register(
        definition(&tools.list, Method::GET, list_params),
        ListEntities { kind },
    )?;

    if let Some(text) = &tools.get {
        registry.register(
            definition(text, Method::GET, vec![id_param()]),
            GetEntity { kind },
        )?;
    }

    if let Some(text) = &tools.create {
        let mut params = vec![ParamSpec::required("name", ParamType::String, "Display name")];
        if let Some(parent) = parent {
            params.push(if tools.parent_required_on_create {
                ParamSpec::required(parent, ParamType::Integer, tools.parent_description)
            } else {
                ParamSpec::optional(parent, ParamType::Integer, tools.parent_description)
            });
        }
        params.push(
            ParamSpec::optional("visible", ParamType::Boolean, "Whether the record is visible")
                .with_default(json!(true)),
        );
        params.push(ParamSpec::optional("comment", ParamType::String, "Free-text comment"));
        registry.register(definition(text, Method::POST, params), CreateEntity { kind })?;
    }

    if let Some(text) = &tools.update {
        let mut params = vec![
            id_param(),
            ParamSpec::optional("name", ParamType::String, "New display name"),
        ];
        if let Some(parent) = parent {
            params.push(ParamSpec::optional(
                parent,
                ParamType::Integer,
                tools.parent_description,
            ));
        }
        params.push(ParamSpec::optional(
            "visible",
            ParamType::Boolean,
            "Whether the record is visible",
        ));
        params.push(ParamSpec::optional("comment", ParamType::String, "Free-text comment"));
        registry.register(definition(text, Method::PATCH, params), UpdateEntity { kind })?;
    }

    if let Some(text) = &tools.set_meta {
        let params = vec![
            id_param(),
            ParamSpec::required("meta_name", ParamType::String, "Configured meta field name"),
            ParamSpec::required("meta_value", ParamType::String, "Value to store"),
        ];
        registry.register(definition(text, Method::PATCH, params), SetEntityMeta { kind })?;
    }

    Ok(())
}

fn definition(text: &ToolText, method: Method, params: Vec<ParamSpec>) -> ToolDefinition {
    ToolDefinition {
        name: text.name,
        title: text.title,
        description: text.description,
        method,
        params,
    }
}

fn item_path(kind: EntityKind, id: i64) -> String {
    format!("{}/{id}", kind.collection_path())
}

/// Writable fields the caller actually supplied. Omitted fields never reach the upstream.
fn supplied_fields(kind: EntityKind, args: &ToolArgs) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    if args.contains("name") {
        body.insert("name".into(), json!(args.require_str("name")?));
    }
    if let Some(parent) = kind.parent_field()
        && let Some(id) = positive_id(args, parent)?
    {
        body.insert(parent.into(), json!(id));
    }
    if let Some(visible) = args.bool("visible") {
        body.insert("visible".into(), json!(visible));
    }
    if let Some(comment) = args.str("comment") {
        body.insert("comment".into(), json!(comment));
    }
    Ok(body)
}

struct ListEntities {
    kind: EntityKind,
}

#[async_trait]
impl ToolHandler for ListEntities {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let mut query = QueryParams::new();
        if let Some(term) = args.str("term").filter(|t| !t.trim().is_empty()) {
            query.push(("term", term.to_string()));
        }
        if let Some(parent) = self.kind.parent_field()
            && let Some(id) = positive_id(args, parent)?
        {
            query.push((parent, id.to_string()));
        }
        if let Some(visible) = args.bool("visible") {
            query.push(("visible", visibility_filter(visible).to_string()));
        }

        let raw = client.get(&self.kind.collection_path(), &query).await?;
        to_payload(&normalize_list(&raw, self.kind)?)
    }
}

struct GetEntity {
    kind: EntityKind,
}

#[async_trait]
impl ToolHandler for GetEntity {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let id = require_positive_id(args, "id")?;
        let raw = client
            .get(&item_path(self.kind, id), &QueryParams::new())
            .await?;
        to_payload(&normalize_entity(&raw, self.kind)?)
    }
}

struct CreateEntity {
    kind: EntityKind,
}

#[async_trait]
impl ToolHandler for CreateEntity {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        args.require_str("name")?;
        let body = supplied_fields(self.kind, args)?;
        let raw = client
            .post(&self.kind.collection_path(), &Value::Object(body))
            .await?;
        to_payload(&normalize_entity(&raw, self.kind)?)
    }
}

struct UpdateEntity {
    kind: EntityKind,
}

#[async_trait]
impl ToolHandler for UpdateEntity {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let id = require_positive_id(args, "id")?;
        let body = supplied_fields(self.kind, args)?;
        if body.is_empty() {
            let mut fields = vec!["name"];
            fields.extend(self.kind.parent_field());
            fields.extend(["visible", "comment"]);
            return Err(ToolError::invalid(format!(
                "at least one of {}",
                fields.join(", ")
            )));
        }

        let raw = client
            .patch(&item_path(self.kind, id), &Value::Object(body))
            .await?;
        to_payload(&normalize_entity(&raw, self.kind)?)
    }
}

struct SetEntityMeta {
    kind: EntityKind,
}

#[async_trait]
impl ToolHandler for SetEntityMeta {
    async fn call(&self, client: &KimaiClient, args: &ToolArgs) -> Result<Value> {
        let id = require_positive_id(args, "id")?;
        let name = args.require_str("meta_name")?;
        let value = args
            .str("meta_value")
            .ok_or_else(|| ToolError::invalid("meta_value"))?;

        let path = format!("{}/meta", item_path(self.kind, id));
        let raw = client
            .patch(&path, &json!({ "name": name, "value": value }))
            .await?;
        to_payload(&normalize_entity(&raw, self.kind)?)
    }
}
