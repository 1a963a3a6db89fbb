//! Artifact rendering.
//!
//! Produces the per-node config (host block followed by one service block per
//! check) and one hostgroup block per group.

use crate::context::GenerationContext;
use crate::resolver::{ResolvedCheck, ResolvedChecks};
use crate::template::{substitute, TemplateError, TemplateSet, Vars};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostgroupArtifact {
    pub group: String,
    pub config: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifacts {
    pub node_name: String,
    pub host_config: String,
    pub hostgroups: Vec<HostgroupArtifact>,
    pub check_count: usize,
}

pub struct Renderer<'a> {
    templates: &'a TemplateSet,
}

impl<'a> Renderer<'a> {
    pub fn new(templates: &'a TemplateSet) -> Self {
        Self { templates }
    }

    pub fn render_host(&self, ctx: &GenerationContext) -> Result<String, TemplateError> {
        let vars = Vars::new()
            .with("node_name", ctx.node_name.as_str())
            .with("local_ipv4", ctx.local_ipv4.as_str())
            .with("contact", ctx.contact.as_str())
            .with("node_groups", ctx.node_groups.join(","));
        substitute("host", &self.templates.host, &vars)
    }

    pub fn render_service(
        &self,
        ctx: &GenerationContext,
        check: &ResolvedCheck,
    ) -> Result<String, TemplateError> {
        let vars = Vars::new()
            .with("node_name", ctx.node_name.as_str())
            .with("contact", ctx.contact.as_str())
            .with("service_name", check.service_name.as_str())
            .with("service_command", check.service_command.as_str());
        substitute("service", &self.templates.service, &vars)
    }

    pub fn render_hostgroup(&self, group: &str) -> Result<String, TemplateError> {
        let vars = Vars::new().with("group_name", group);
        substitute("hostgroup", &self.templates.hostgroup, &vars)
    }

    /// Host block, then service blocks in resolver order, one blank line
    /// between blocks, trailing whitespace trimmed.
    pub fn render_node_config(
        &self,
        ctx: &GenerationContext,
        checks: &ResolvedChecks,
    ) -> Result<String, TemplateError> {
        let mut blocks = Vec::with_capacity(checks.len() + 1);
        blocks.push(self.render_host(ctx)?);
        for check in checks {
            blocks.push(self.render_service(ctx, check)?);
        }

        let joined = blocks
            .iter()
            .map(|b| b.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(joined.trim_end().to_string())
    }

    pub fn render(
        &self,
        ctx: &GenerationContext,
        checks: &ResolvedChecks,
    ) -> Result<GeneratedArtifacts, TemplateError> {
        let host_config = self.render_node_config(ctx, checks)?;
        let hostgroups = ctx
            .node_groups
            .iter()
            .map(|group| {
                Ok(HostgroupArtifact {
                    group: group.clone(),
                    config: self.render_hostgroup(group)?.trim_end().to_string(),
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        Ok(GeneratedArtifacts {
            node_name: ctx.node_name.clone(),
            host_config,
            hostgroups,
            check_count: checks.len(),
        })
    }
}
