//! Project model for Scout
//!
//! A project is one watched source tree: where it lives, where compass should
//! read and write, and the build options handed to the watcher.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique, immutable identifier assigned by the store at creation
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn generate() -> Self {
        ProjectKey(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProjectKey {
    fn from(s: &str) -> Self {
        ProjectKey(s.to_string())
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compass environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {}", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sass output style
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    Nested,
    #[default]
    Expanded,
    Compact,
    Compressed,
}

impl OutputStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStyle::Nested => "nested",
            OutputStyle::Expanded => "expanded",
            OutputStyle::Compact => "compact",
            OutputStyle::Compressed => "compressed",
        }
    }
}

impl FromStr for OutputStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nested" => Ok(OutputStyle::Nested),
            "expanded" => Ok(OutputStyle::Expanded),
            "compact" => Ok(OutputStyle::Compact),
            "compressed" => Ok(OutputStyle::Compressed),
            other => Err(format!("unknown output style: {}", other)),
        }
    }
}

impl fmt::Display for OutputStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted project record
///
/// Directory fields are plain strings; an empty string means "unset, let
/// compass use its default".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub key: ProjectKey,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_dir: String,
    #[serde(default)]
    pub sass_dir: String,
    #[serde(default)]
    pub css_dir: String,
    #[serde(default)]
    pub javascripts_dir: String,
    #[serde(default)]
    pub images_dir: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub output_style: OutputStyle,
}

impl ProjectRecord {
    pub fn dir(&self, field: DirField) -> &str {
        match field {
            DirField::Sass => &self.sass_dir,
            DirField::Css => &self.css_dir,
            DirField::Javascripts => &self.javascripts_dir,
            DirField::Images => &self.images_dir,
        }
    }

    pub fn set_dir(&mut self, field: DirField, value: impl Into<String>) {
        let slot = match field {
            DirField::Sass => &mut self.sass_dir,
            DirField::Css => &mut self.css_dir,
            DirField::Javascripts => &mut self.javascripts_dir,
            DirField::Images => &mut self.images_dir,
        };
        *slot = value.into();
    }
}

/// The optional output directories a project can configure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirField {
    Sass,
    Css,
    Javascripts,
    Images,
}

impl DirField {
    pub const ALL: [DirField; 4] = [
        DirField::Sass,
        DirField::Css,
        DirField::Javascripts,
        DirField::Images,
    ];

    /// Compass command line flag for this directory
    pub fn flag(&self) -> &'static str {
        match self {
            DirField::Sass => "--sass-dir",
            DirField::Css => "--css-dir",
            DirField::Javascripts => "--javascripts-dir",
            DirField::Images => "--images-dir",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DirField::Sass => "sass",
            DirField::Css => "css",
            DirField::Javascripts => "javascripts",
            DirField::Images => "images",
        }
    }
}

impl FromStr for DirField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sass" | "scss" => Ok(DirField::Sass),
            "css" => Ok(DirField::Css),
            "javascripts" | "js" => Ok(DirField::Javascripts),
            "images" | "img" => Ok(DirField::Images),
            other => Err(format!("unknown directory field: {}", other)),
        }
    }
}

/// Caller-supplied fields for a new project; anything left `None` takes the default
#[derive(Clone, Debug, Default)]
pub struct NewProject {
    pub name: Option<String>,
    pub project_dir: Option<String>,
    pub sass_dir: Option<String>,
    pub css_dir: Option<String>,
    pub javascripts_dir: Option<String>,
    pub images_dir: Option<String>,
    pub environment: Option<Environment>,
    pub output_style: Option<OutputStyle>,
}

impl NewProject {
    pub fn new(name: impl Into<String>, project_dir: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            project_dir: Some(project_dir.into()),
            ..Self::default()
        }
    }

    /// Project named after the last segment of `dir`
    pub fn from_dir(dir: &str) -> Self {
        Self::new(name_from_dir(dir), dir)
    }

    pub fn with_dir(mut self, field: DirField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            DirField::Sass => self.sass_dir = value,
            DirField::Css => self.css_dir = value,
            DirField::Javascripts => self.javascripts_dir = value,
            DirField::Images => self.images_dir = value,
        }
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_output_style(mut self, output_style: OutputStyle) -> Self {
        self.output_style = Some(output_style);
        self
    }

    pub fn into_record(self, key: ProjectKey) -> ProjectRecord {
        ProjectRecord {
            key,
            name: self.name.unwrap_or_default(),
            project_dir: self.project_dir.unwrap_or_default(),
            sass_dir: self.sass_dir.unwrap_or_default(),
            css_dir: self.css_dir.unwrap_or_default(),
            javascripts_dir: self.javascripts_dir.unwrap_or_default(),
            images_dir: self.images_dir.unwrap_or_default(),
            environment: self.environment.unwrap_or_default(),
            output_style: self.output_style.unwrap_or_default(),
        }
    }
}

/// Last path segment, ignoring trailing separators. Understands both `/` and `\`.
pub fn name_from_dir(dir: &str) -> String {
    dir.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Strip a `file://` scheme from a dropped uri-list entry
pub fn dir_from_uri(uri: &str) -> String {
    let first = uri
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or_default();
    first
        .strip_prefix("file://localhost")
        .or_else(|| first.strip_prefix("file://"))
        .unwrap_or(first)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_unset_fields() {
        let record = NewProject::new("p1", "/tmp/p1").into_record(ProjectKey::from("k"));
        assert_eq!(record.name, "p1");
        assert_eq!(record.project_dir, "/tmp/p1");
        assert_eq!(record.sass_dir, "");
        assert_eq!(record.css_dir, "");
        assert_eq!(record.javascripts_dir, "");
        assert_eq!(record.images_dir, "");
        assert_eq!(record.environment, Environment::Development);
        assert_eq!(record.output_style, OutputStyle::Expanded);
    }

    #[test]
    fn test_name_from_dir() {
        assert_eq!(name_from_dir("/some/path/project-a"), "project-a");
        assert_eq!(name_from_dir("/some/path/project-a/"), "project-a");
        assert_eq!(name_from_dir("C:\\Users\\me\\site\\"), "site");
        assert_eq!(name_from_dir("project"), "project");
    }

    #[test]
    fn test_dir_from_uri() {
        assert_eq!(dir_from_uri("file:///Users/me/site/"), "/Users/me/site/");
        assert_eq!(dir_from_uri("file://localhost/srv/site"), "/srv/site");
        assert_eq!(dir_from_uri("# comment\r\n/plain/path\r\n"), "/plain/path");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = NewProject::new("p", "/p")
            .with_dir(DirField::Javascripts, "/p/js")
            .with_output_style(OutputStyle::Compressed)
            .into_record(ProjectKey::from("abc"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["key"], "abc");
        assert_eq!(json["projectDir"], "/p");
        assert_eq!(json["javascriptsDir"], "/p/js");
        assert_eq!(json["outputStyle"], "compressed");
        assert_eq!(json["environment"], "development");
    }

    #[test]
    fn test_set_dir() {
        let mut record = NewProject::new("p", "/p").into_record(ProjectKey::from("k"));
        record.set_dir(DirField::Images, "/p/img");
        assert_eq!(record.dir(DirField::Images), "/p/img");
        assert_eq!(record.dir(DirField::Css), "");
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("compact".parse::<OutputStyle>(), Ok(OutputStyle::Compact));
        assert!("loud".parse::<OutputStyle>().is_err());
        assert_eq!("js".parse::<DirField>(), Ok(DirField::Javascripts));
    }
}
