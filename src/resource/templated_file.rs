//! Templated file resource - render a template to a file on the host

use super::attrs::FileAttrs;
use super::file::{converge_file, desired_file, file_diff, observe_file};
use super::validate;
use declarative::{ApplyContext, ApplyResult, Resource, ResourceState, Result};
use serde::Deserialize;

/// A file whose content is a registered template rendered against the
/// host's variables
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplatedFile {
    /// Template id, relative to the templates directory
    pub template: String,
    pub dest: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl TemplatedFile {
    pub fn new(template: impl Into<String>, dest: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            dest: dest.into(),
            owner: None,
            group: None,
            mode: None,
        }
    }

    fn attrs(&self) -> FileAttrs {
        FileAttrs::new(&self.owner, &self.group, &self.mode)
    }
}

impl Resource for TemplatedFile {
    fn id(&self) -> String {
        self.dest.clone()
    }

    fn description(&self) -> String {
        format!("Render {} to {}", self.template, self.dest)
    }

    fn resource_type(&self) -> &'static str {
        "templated_file"
    }

    fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        validate::required(&mut problems, "template", &self.template);
        validate::absolute_path(&mut problems, "dest", &self.dest);
        FileAttrs::validate(&mut problems, &self.owner, &self.group, &self.mode);
        problems
    }

    fn current_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        observe_file(ctx, &self.dest, &self.attrs())
    }

    fn desired_state(&self, ctx: &ApplyContext) -> Result<ResourceState> {
        Ok(desired_file(&ctx.render(&self.template)?, &self.attrs()))
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let content = ctx.render(&self.template)?;
        converge_file(ctx, &self.dest, &content, &self.attrs())
    }

    fn content_diff(&self, ctx: &ApplyContext) -> Result<Option<String>> {
        file_diff(ctx, &self.dest, &ctx.render(&self.template)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::tests::Harness;
    use declarative::ErrorCategory;

    const PROXY: &str = "\
server {
    listen 443 ssl;
    server_name {{ domains | join(\" \") }};
{% for upstream in upstreams %}
    location /{{ upstream.path }} { proxy_pass http://127.0.0.1:{{ upstream.port }}; }
{% endfor %}
}
";

    fn harness() -> Harness {
        let mut harness = Harness::new();
        harness.renderer.add("nginx/site.conf", PROXY);
        harness.vars.insert("domains", vec!["shop.example.org", "www.shop.example.org"]);
        let upstream = |path: &str, port: i64| {
            let mut map = std::collections::BTreeMap::new();
            map.insert("path".to_string(), stencil::Value::from(path));
            map.insert("port".to_string(), stencil::Value::Int(port));
            stencil::Value::Map(map)
        };
        harness
            .vars
            .insert("upstreams", stencil::Value::List(vec![upstream("", 8000), upstream("api", 8001)]));
        harness.host.add_dir("/etc/nginx/sites-enabled");
        harness
    }

    fn site() -> TemplatedFile {
        TemplatedFile {
            mode: Some("0644".into()),
            ..TemplatedFile::new("nginx/site.conf", "/etc/nginx/sites-enabled/shop")
        }
    }

    #[test]
    fn test_render_then_unchanged() {
        let harness = harness();
        assert_eq!(harness.apply_twice(&site(), true), ApplyResult::Created);

        let written = String::from_utf8(harness.host.content("/etc/nginx/sites-enabled/shop").unwrap()).unwrap();
        assert!(written.contains("server_name shop.example.org www.shop.example.org;"));
        assert!(written.contains("location /api { proxy_pass http://127.0.0.1:8001; }"));
        assert!(!written.contains("{%"));
    }

    #[test]
    fn test_changed_variables_rewrite_file() {
        let mut harness = harness();
        harness.apply_twice(&site(), true);

        harness.vars.insert("domains", vec!["shop.example.org"]);
        let ctx = harness.ctx(true);
        let diff = site().content_diff(&ctx).unwrap().unwrap();
        assert!(diff.contains("-    server_name shop.example.org www.shop.example.org;"));
        assert!(diff.contains("+    server_name shop.example.org;"));
        drop(ctx);

        assert_eq!(harness.apply_twice(&site(), true), ApplyResult::Modified);
    }

    #[test]
    fn test_undefined_variable_writes_nothing() {
        let mut harness = harness();
        harness.renderer.add("broken.conf", "upstream {{ backend_port }}\n");
        let file = TemplatedFile::new("broken.conf", "/etc/nginx/sites-enabled/broken");

        let err = file.apply(&harness.ctx(true)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Template);
        assert!(err.to_string().contains("backend_port"));
        assert!(harness.host.content("/etc/nginx/sites-enabled/broken").is_none());
    }
}
