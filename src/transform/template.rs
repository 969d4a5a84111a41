// src/transform/template.rs

//! Handlebars template rendering.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use handlebars::{
    Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext,
    RenderErrorReason, Renderable,
};
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::parse_template_data;
use crate::fs::{walk_files, FileSystem};
use crate::transform::{OutputFile, SourceFile, Transform, TransformFuture};
use crate::watch::path_utils::to_slash;

const PARTIAL_EXTENSIONS: &[&str] = &["hbs", "handlebars"];

/// `{{> name}}` references. Partial blocks (`{{#> name}}`) are left alone:
/// they render their own fallback when the partial is missing.
const PARTIAL_REF: &str = r"\{\{~?\s*>\s*([A-Za-z0-9_./-]+)";

/// Where template data comes from.
#[derive(Debug, Clone)]
pub enum TemplateData {
    /// A fixed value.
    Value(JsonValue),
    /// A TOML or JSON file, read again on every invocation.
    File(PathBuf),
}

impl Default for TemplateData {
    fn default() -> Self {
        TemplateData::Value(JsonValue::Object(Default::default()))
    }
}

impl From<JsonValue> for TemplateData {
    fn from(value: JsonValue) -> Self {
        TemplateData::Value(value)
    }
}

impl TemplateData {
    fn load(&self, fs: &dyn FileSystem) -> Result<JsonValue> {
        match self {
            TemplateData::Value(value) => Ok(value.clone()),
            TemplateData::File(path) => {
                let contents = fs
                    .read_to_string(path)
                    .with_context(|| format!("reading template data file {:?}", path))?;
                parse_template_data(path, &contents)
                    .with_context(|| format!("loading template data file {:?}", path))
            }
        }
    }
}

/// Renders each input as a Handlebars template against the project data.
///
/// Files under the partials directory are registered by their path relative
/// to that directory, without extension (`partials/footer.hbs` is
/// `{{> footer}}`). Layouts use partial blocks:
/// `{{#> layout}}...{{/layout}}` with `{{> @partial-block}}` in the layout.
///
/// Partials and data are read at the start of every invocation
/// ([`Transform::prepare`]), so a watch-triggered rebuild sees their
/// current contents. With `ignore_partials` a reference to a missing
/// partial renders empty instead of failing.
pub struct TemplateTransform {
    data: TemplateData,
    partials_dir: Option<PathBuf>,
    strict: bool,
    ignore_partials: bool,
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for TemplateTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateTransform")
            .field("data", &self.data)
            .field("partials_dir", &self.partials_dir)
            .field("strict", &self.strict)
            .field("ignore_partials", &self.ignore_partials)
            .finish_non_exhaustive()
    }
}

impl TemplateTransform {
    pub fn new(data: impl Into<TemplateData>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            data: data.into(),
            partials_dir: None,
            strict: false,
            ignore_partials: true,
            fs,
        }
    }

    pub fn with_partials(mut self, dir: Option<PathBuf>) -> Self {
        self.partials_dir = dir;
        self
    }

    /// Fail on missing fields. Strict mode also fails on missing partials.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn ignore_partials(mut self, ignore: bool) -> Self {
        self.ignore_partials = ignore;
        self
    }

    /// Build a renderer from the partials and data as they are now.
    pub fn load(&self) -> Result<TemplateRenderer> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(self.strict);
        register_helpers(&mut handlebars);

        let mut sources = Vec::new();
        if let Some(dir) = &self.partials_dir {
            sources = register_partials(&mut handlebars, dir, self.fs.as_ref())?;
        }

        let partial_ref = if self.ignore_partials && !self.strict {
            let re = Regex::new(PARTIAL_REF)?;
            // Partials may reference each other.
            for text in sources.iter() {
                stub_missing_partials(&mut handlebars, &re, text)?;
            }
            Some(re)
        } else {
            None
        };

        Ok(TemplateRenderer {
            handlebars,
            data: self.data.load(self.fs.as_ref())?,
            partial_ref,
        })
    }
}

/// A loaded registry and data, used for one invocation.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
    data: JsonValue,
    /// Set when missing partials render empty.
    partial_ref: Option<Regex>,
}

impl fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("partials", &self.handlebars.get_templates().len())
            .field("ignore_partials", &self.partial_ref.is_some())
            .finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    pub fn render(&self, template: &str) -> Result<String> {
        if let Some(re) = &self.partial_ref {
            if !missing_partials(&self.handlebars, re, template).is_empty() {
                let mut handlebars = self.handlebars.clone();
                stub_missing_partials(&mut handlebars, re, template)?;
                return Ok(handlebars.render_template(template, &self.data)?);
            }
        }
        Ok(self.handlebars.render_template(template, &self.data)?)
    }
}

fn missing_partials<'t>(
    handlebars: &Handlebars<'static>,
    re: &Regex,
    text: &'t str,
) -> BTreeSet<&'t str> {
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|name| !handlebars.has_template(name))
        .collect()
}

/// Register an empty partial for every unknown `{{> name}}` in `text`.
fn stub_missing_partials(handlebars: &mut Handlebars<'static>, re: &Regex, text: &str) -> Result<()> {
    for name in missing_partials(handlebars, re, text) {
        debug!(partial = %name, "ignoring missing partial");
        handlebars
            .register_partial(name, "")
            .with_context(|| format!("registering empty partial {name}"))?;
    }
    Ok(())
}

/// Returns the text of every registered partial.
fn register_partials(
    handlebars: &mut Handlebars<'static>,
    dir: &Path,
    fs: &dyn FileSystem,
) -> Result<Vec<String>> {
    let mut sources = Vec::new();
    for path in walk_files(fs, dir)? {
        let is_partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| PARTIAL_EXTENSIONS.contains(&e));
        if !is_partial {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        let name = to_slash(&rel.with_extension(""));
        let text = fs.read_to_string(&path)?;
        handlebars
            .register_partial(&name, text.as_str())
            .with_context(|| format!("registering partial {name}"))?;
        debug!(partial = %name, "registered template partial");
        sources.push(text);
    }
    Ok(sources)
}

fn register_helpers(handlebars: &mut Handlebars<'static>) {
    handlebars.register_helper("capitals", Box::new(capitals_helper));
    handlebars.register_helper("repeat", Box::new(RepeatHelper));
}

/// `{{capitals name}}`: upper-cases a string.
fn capitals_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .and_then(|v| v.value().as_str())
        .ok_or(RenderErrorReason::ParamNotFoundForIndex("capitals", 0))?;
    out.write(&input.to_uppercase())?;
    Ok(())
}

/// `{{#repeat 3}}...{{/repeat}}`: renders its block n times.
#[derive(Clone, Copy)]
struct RepeatHelper;

impl HelperDef for RepeatHelper {
    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        let count = h
            .param(0)
            .and_then(|v| v.value().as_u64())
            .ok_or(RenderErrorReason::ParamNotFoundForIndex("repeat", 0))?;
        if let Some(block) = h.template() {
            for _ in 0..count {
                block.render(r, ctx, rc, out)?;
            }
        }
        Ok(())
    }
}

impl Transform for TemplateTransform {
    fn name(&self) -> &str {
        "template"
    }

    fn prepare(&self) -> Result<Option<Arc<dyn Transform>>> {
        Ok(Some(Arc::new(self.load()?)))
    }

    fn apply<'a>(&'a self, file: SourceFile) -> TransformFuture<'a> {
        Box::pin(async move { render_file(&self.load()?, file) })
    }
}

impl Transform for TemplateRenderer {
    fn name(&self) -> &str {
        "template"
    }

    fn apply<'a>(&'a self, file: SourceFile) -> TransformFuture<'a> {
        Box::pin(async move { render_file(self, file) })
    }
}

fn render_file(renderer: &TemplateRenderer, file: SourceFile) -> Result<OutputFile> {
    let text = std::str::from_utf8(&file.contents)
        .with_context(|| format!("template {} is not valid UTF-8", file.path.display()))?;
    let rendered = renderer.render(text)?;
    Ok(OutputFile::same_path(&file, rendered.into_bytes()))
}
