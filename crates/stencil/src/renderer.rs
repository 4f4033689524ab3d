//! Template registry on top of minijinja

use crate::error::{Error, Result};
use crate::vars::Vars;
use minijinja::value::ValueKind;
use minijinja::{AutoEscape, Environment, ErrorKind, Output, State, UndefinedBehavior};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::fmt::Write as _;
use std::path::Path;
use walkdir::WalkDir;

/// Engine configuration shared by templates and guard expressions.
///
/// - undefined variables are errors (`is defined` and `default` still work)
/// - a block tag alone on its line takes its indentation and newline with it
/// - output is never escaped, and a file's trailing newline is kept
pub(crate) fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_formatter(write_scalar);
    env
}

/// Scalars are written as plain text and `none` as nothing. Lists and maps
/// must go through `join` first.
fn write_scalar(
    out: &mut Output<'_>,
    _state: &State<'_, '_>,
    value: &minijinja::Value,
) -> std::result::Result<(), minijinja::Error> {
    let shape = match value.kind() {
        ValueKind::None | ValueKind::Undefined => return Ok(()),
        ValueKind::Seq | ValueKind::Iterable => "list",
        ValueKind::Map => "map",
        _ => return write!(out, "{value}").map_err(minijinja::Error::from),
    };
    Err(minijinja::Error::new(
        ErrorKind::InvalidOperation,
        format!("cannot write a {shape} into output; use the join filter"),
    ))
}

/// First referenced variable path that `vars` cannot resolve
pub(crate) fn first_missing(referenced: HashSet<String>, vars: &Vars) -> Option<String> {
    referenced
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .find(|path| vars.lookup(path).is_none())
}

/// Holds templates by id and renders them against a variable context.
///
/// Templates are compiled once when added. A template that fails to compile
/// is kept along with its error so that only the tasks using it fail.
pub struct Renderer {
    env: Environment<'static>,
    broken: BTreeMap<String, Error>,
    ids: BTreeSet<String>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("templates", &self.ids)
            .field("broken", &self.broken.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            env: environment(),
            broken: BTreeMap::new(),
            ids: BTreeSet::new(),
        }
    }

    /// Register a template under `id`, replacing any existing one
    pub fn add(&mut self, id: impl Into<String>, source: &str) {
        let id = id.into();
        self.env.remove_template(&id);
        self.broken.remove(&id);
        if let Err(e) = self.env.add_template_owned(id.clone(), source.to_string()) {
            log::debug!("Template {id} failed to parse: {e}");
            self.broken
                .insert(id.clone(), Error::from_engine(&e, &id, 1, None));
        }
        self.ids.insert(id);
    }

    /// Load every file under `dir`; ids are paths relative to `dir`.
    ///
    /// Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut count = 0;
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Io {
                path: e.path().unwrap_or(dir).to_path_buf(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let source = std::fs::read_to_string(path).map_err(|e| Error::Io {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            self.add(id, &source);
            count += 1;
        }
        log::debug!("Loaded {count} template(s) from {}", dir.display());
        Ok(count)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Registered template ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Render template `id` to bytes
    pub fn render(&self, id: &str, vars: &Vars) -> Result<Vec<u8>> {
        if let Some(err) = self.broken.get(id) {
            return Err(err.clone());
        }
        let template = self
            .env
            .get_template(id)
            .map_err(|_| Error::NotFound(id.to_string()))?;
        template
            .render(vars)
            .map(String::into_bytes)
            .map_err(|e| {
                let missing = (e.kind() == ErrorKind::UndefinedError)
                    .then(|| first_missing(template.undeclared_variables(true), vars))
                    .flatten();
                Error::from_engine(&e, id, 1, missing)
            })
    }

    /// Render an inline template that is not part of the registry
    pub fn render_str(&self, source: &str, origin: &str, vars: &Vars) -> Result<String> {
        if !source.contains("{{") && !source.contains("{%") && !source.contains("{#") {
            return Ok(source.to_string());
        }
        self.env.render_str(source, vars).map_err(|e| {
            let missing = (e.kind() == ErrorKind::UndefinedError)
                .then(|| {
                    let env = environment();
                    let template = env.template_from_str(source).ok()?;
                    first_missing(template.undeclared_variables(true), vars)
                })
                .flatten();
            Error::from_engine(&e, origin, 1, missing)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use tempfile::TempDir;

    fn site_vars() -> Vars {
        let mut vars = Vars::new();
        vars.insert("app_name", "fetcher");
        vars.insert("domains", vec!["example.org", "www.example.org"]);
        vars.insert("port", Value::Int(8000));
        vars.insert("tls", true);
        vars
    }

    fn render(src: &str, vars: &Vars) -> Result<String> {
        let mut renderer = Renderer::new();
        renderer.add("test.conf", src);
        renderer
            .render("test.conf", vars)
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_render_registered_template() {
        let mut renderer = Renderer::new();
        renderer.add("nginx/site.conf", "server_name {{ domains | join(' ') }};\n");

        let mut vars = Vars::new();
        vars.insert("domains", vec!["a.org", "b.org"]);

        let first = renderer.render("nginx/site.conf", &vars).unwrap();
        let second = renderer.render("nginx/site.conf", &vars).unwrap();
        assert_eq!(first, b"server_name a.org b.org;\n");
        assert_eq!(first, second);
    }

    #[test]
    fn test_substitution_and_loop() {
        let out = render("upstream {{ app_name }} { server 127.0.0.1:{{ port }}; }", &site_vars());
        assert_eq!(out.unwrap(), "upstream fetcher { server 127.0.0.1:8000; }");

        let src = "server_name{% for d in domains %} {{ d }}{% endfor %};";
        assert_eq!(
            render(src, &site_vars()).unwrap(),
            "server_name example.org www.example.org;"
        );
    }

    #[test]
    fn test_standalone_tags_are_removed() {
        let src = "server {\n    {% if tls %}\n    listen 443 ssl;\n    {% else %}\n    listen 80;\n    {% endif %}\n}\n";
        assert_eq!(
            render(src, &site_vars()).unwrap(),
            "server {\n    listen 443 ssl;\n}\n"
        );
    }

    #[test]
    fn test_loop_metadata_and_else() {
        let src = "{% for d in domains %}{{ loop.index }}:{{ d }}{% if not loop.last %},{% endif %}{% endfor %}";
        assert_eq!(
            render(src, &site_vars()).unwrap(),
            "1:example.org,2:www.example.org"
        );

        let mut vars = site_vars();
        vars.insert("domains", Vec::<Value>::new());
        let src = "{% for d in domains %}{{ d }}{% else %}_{% endfor %}";
        assert_eq!(render(src, &vars).unwrap(), "_");
    }

    #[test]
    fn test_map_items_are_sorted() {
        let mut vars = Vars::new();
        let mut headers = BTreeMap::new();
        headers.insert("X-B".to_string(), Value::from("2"));
        headers.insert("X-A".to_string(), Value::from("1"));
        vars.insert("headers", Value::Map(headers));
        let src = "{% for k, v in headers | items %}{{ k }}={{ v }};{% endfor %}";
        assert_eq!(render(src, &vars).unwrap(), "X-A=1;X-B=2;");
    }

    #[test]
    fn test_elif_chain_and_comments() {
        let src = "{% if port == 80 %}http{% elif port == 8000 %}dev{% else %}other{% endif %}";
        assert_eq!(render(src, &site_vars()).unwrap(), "dev");
        assert_eq!(render("a{# note #}b", &Vars::new()).unwrap(), "ab");
    }

    #[test]
    fn test_undefined_variable_names_path_and_line() {
        let err = render("line one\nline two {{ app.name }}\n", &site_vars()).unwrap_err();
        assert_eq!(
            err,
            Error::Undefined {
                origin: "test.conf".into(),
                line: 2,
                name: "app.name".into()
            }
        );
    }

    #[test]
    fn test_defaults_guard_undefined() {
        let src = "{{ workers | default(2) }}{% if tls_cert is defined %}x{% endif %}";
        assert_eq!(render(src, &site_vars()).unwrap(), "2");
    }

    #[test]
    fn test_list_output_is_type_error() {
        let err = render("{{ domains }}", &site_vars()).unwrap_err();
        assert!(matches!(err, Error::Type { .. }));
        assert!(err.to_string().contains("join"));
    }

    #[test]
    fn test_none_renders_empty() {
        let mut vars = Vars::new();
        vars.insert("suffix", Value::Null);
        assert_eq!(render("app{{ suffix }}", &vars).unwrap(), "app");
    }

    #[test]
    fn test_unknown_template() {
        let renderer = Renderer::new();
        let err = renderer.render("missing.conf", &Vars::new()).unwrap_err();
        assert_eq!(err, Error::NotFound("missing.conf".into()));
    }

    #[test]
    fn test_parse_error_surfaces_on_render() {
        let mut renderer = Renderer::new();
        renderer.add("bad", "{% if x %}");
        renderer.add("stray", "a\n{% endfor %}");
        renderer.add("open", "{{ app_name");
        renderer.add("good", "ok");
        assert!(renderer.contains("bad"));
        for id in ["bad", "stray", "open"] {
            assert!(matches!(
                renderer.render(id, &Vars::new()).unwrap_err(),
                Error::Syntax { .. }
            ));
        }
        assert_eq!(renderer.render("good", &Vars::new()).unwrap(), b"ok");

        renderer.add("bad", "fixed");
        assert_eq!(renderer.render("bad", &Vars::new()).unwrap(), b"fixed");
    }

    #[test]
    fn test_load_dir_uses_relative_ids() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("nginx")).unwrap();
        std::fs::write(dir.path().join("nginx/site.conf"), "{{ app }}").unwrap();
        std::fs::write(dir.path().join("motd"), "hello").unwrap();

        let mut renderer = Renderer::new();
        assert_eq!(renderer.load_dir(dir.path()).unwrap(), 2);
        assert_eq!(renderer.ids().collect::<Vec<_>>(), vec!["motd", "nginx/site.conf"]);

        let mut vars = Vars::new();
        vars.insert("app", "fetcher");
        assert_eq!(renderer.render("nginx/site.conf", &vars).unwrap(), b"fetcher");
    }

    #[test]
    fn test_render_str_plain_text_passthrough() {
        let renderer = Renderer::new();
        let out = renderer
            .render_str("/srv/app", "dest", &Vars::new())
            .unwrap();
        assert_eq!(out, "/srv/app");

        let mut vars = Vars::new();
        vars.insert("app_name", "fetcher");
        let out = renderer
            .render_str("/srv/{{ app_name }}", "dest", &vars)
            .unwrap();
        assert_eq!(out, "/srv/fetcher");

        let err = renderer
            .render_str("/srv/{{ missing }}", "task 'app-dir'", &vars)
            .unwrap_err();
        assert!(matches!(err, Error::Undefined { ref name, .. } if name == "missing"));
    }
}
