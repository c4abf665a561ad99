// Matrix definition models
// Deserialized shape of a matrix document and the expanded per-job config

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

/// A matrix document as written by the user. One document expands into one
/// `JobConfig` per axis combination.
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixDefinition {
    pub build: BuildSection,
    #[serde(default)]
    pub deploy: Option<PhaseSpec>,
    #[serde(default)]
    pub notify: Option<PhaseSpec>,
    #[serde(default)]
    pub compose: BTreeMap<String, ServiceSpec>,
}

/// The `build:` section of a matrix document.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
    pub image: String,
    #[serde(default)]
    pub environment: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A `deploy:` or `notify:` section: an ordered list of commands run in the
/// job's environment.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseSpec {
    #[serde(default)]
    pub commands: Vec<String>,
}

/// One entry of the `compose:` section: an auxiliary service container
/// started alongside the build.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSpec {
    pub image: String,
    #[serde(default)]
    pub environment: Vec<String>,
}

/// The axis-value substitutions that produced one expanded job, keyed by
/// axis name. Empty for documents without a `matrix:` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Axis(BTreeMap<String, String>);

impl Axis {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value of one axis variable, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "default");
        }
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// One expanded matrix entry. Immutable once produced by the expander.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Container image the build runs in.
    pub image: String,
    /// Environment variables in `KEY=VALUE` form.
    pub environment: Vec<String>,
    /// Ordered build commands.
    pub commands: Vec<String>,
    /// Auxiliary service containers, keyed by service name.
    pub services: BTreeMap<String, ServiceSpec>,
    /// Deploy phase, when declared.
    pub deploy: Option<PhaseSpec>,
    /// Notify phase, when declared.
    pub notify: Option<PhaseSpec>,
    /// The axis combination this job was expanded from.
    pub axis: Axis,
}

impl JobConfig {
    pub(crate) fn from_definition(def: MatrixDefinition, axis: Axis) -> Self {
        Self {
            image: def.build.image,
            environment: def.build.environment,
            commands: def.build.commands,
            services: def.compose,
            deploy: def.deploy,
            notify: def.notify,
            axis,
        }
    }
}
