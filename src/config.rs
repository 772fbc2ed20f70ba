//! Host configuration for the coordinator: the ambient "tri-state option"
//! pattern is carried over from `rls::config::Config`'s `Inferrable<T>`,
//! which distinguishes a user-specified value from one the server may still
//! infer, and from an explicit `null` that resets prior inference.

use std::fmt::Debug;
use std::path::PathBuf;

use serde::de::{Deserialize, Deserializer};
use serde_derive::{Deserialize as DeriveDeserialize, Serialize};

use crate::script::ScriptKind;

#[derive(Clone, Debug, Serialize)]
pub enum Inferrable<T> {
    /// Explicitly specified by the client. Can replace every other variant.
    Specified(T),
    /// Inferred by the server. Cannot replace a `Specified` variant.
    Inferred(T),
    /// Deserialized from an explicit `null`; must be replaced before use.
    None,
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Inferrable<T> {
    fn deserialize<D>(deserializer: D) -> Result<Inferrable<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<T>::deserialize(deserializer)?;
        Ok(match value {
            None => Inferrable::None,
            Some(value) => Inferrable::Specified(value),
        })
    }
}

impl<T> Inferrable<T> {
    pub fn is_none(&self) -> bool {
        matches!(self, Inferrable::None)
    }
}

impl<T: Clone + Debug> Inferrable<T> {
    /// Combine these inferrable values, preferring an already-specified
    /// value over an incoming inferred one, and falling back to `default`
    /// when the incoming value is an explicit `null`.
    pub fn combine_with_default(&self, new: &Self, default: T) -> Self {
        match (self, new) {
            (Inferrable::Specified(_), Inferrable::Inferred(_)) => self.clone(),
            (_, Inferrable::None) => Inferrable::Inferred(default),
            _ => new.clone(),
        }
    }

    pub fn infer(&mut self, value: T) {
        if matches!(self, Inferrable::Specified(_)) {
            return;
        }
        *self = Inferrable::Inferred(value);
    }
}

impl<T> AsRef<T> for Inferrable<T> {
    fn as_ref(&self) -> &T {
        match self {
            Inferrable::Inferred(value) | Inferrable::Specified(value) => value,
            Inferrable::None => unreachable!("Inferrable::None must be resolved before use"),
        }
    }
}

impl<T: Default> Default for Inferrable<T> {
    fn default() -> Self {
        Inferrable::Inferred(T::default())
    }
}

/// Formatting options handed through from the client, opaque to the
/// coordinator beyond the fields it needs for the compiler-host adapter.
#[derive(Clone, Debug, Default, DeriveDeserialize, Serialize, PartialEq, Eq)]
pub struct FormatOptions {
    pub indent_size: Option<u32>,
    pub tab_size: Option<u32>,
    pub convert_tabs_to_spaces: Option<bool>,
}

/// Identifying information about the connected client, used only for
/// telemetry and diagnostics, never for behavior decisions.
#[derive(Clone, Debug, Default, DeriveDeserialize, Serialize, PartialEq, Eq)]
pub struct HostInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// An additional file extension the host wants treated as a script, and
/// which kind it should be treated as.
#[derive(Clone, Debug, DeriveDeserialize, Serialize, PartialEq, Eq)]
pub struct ExtraFileExtension {
    pub extension: String,
    pub script_kind: ExtraScriptKind,
}

#[derive(Clone, Copy, Debug, DeriveDeserialize, Serialize, PartialEq, Eq)]
pub enum ExtraScriptKind {
    Js,
    Jsx,
    Ts,
    Tsx,
}

impl From<ExtraScriptKind> for ScriptKind {
    fn from(kind: ExtraScriptKind) -> ScriptKind {
        match kind {
            ExtraScriptKind::Js => ScriptKind::Js,
            ExtraScriptKind::Jsx => ScriptKind::Jsx,
            ExtraScriptKind::Ts => ScriptKind::Ts,
            ExtraScriptKind::Tsx => ScriptKind::Tsx,
        }
    }
}

/// Aggregate payload for `setHostConfiguration`, spec §6. Every field is
/// optional: a call only updates the fields it sets. `format_options` nests
/// `Inferrable` inside that outer `Option`: the outer `None` means this call
/// didn't touch formatting at all, while a present `Inferrable::None` means
/// the client explicitly nulled it out and formatting should fall back to
/// inferred defaults rather than keep whatever was specified before.
#[derive(Clone, Debug, Default)]
pub struct HostConfigurationUpdate {
    pub file: Option<PathBuf>,
    pub host_info: Option<HostInfo>,
    pub format_options: Option<Inferrable<FormatOptions>>,
    pub extra_file_extensions: Option<Vec<ExtraFileExtension>>,
}

/// The coordinator's resolved view of host configuration.
#[derive(Clone, Debug, Default)]
pub struct HostConfiguration {
    pub file: Option<PathBuf>,
    pub host_info: HostInfo,
    pub format_options: Inferrable<FormatOptions>,
    pub extra_file_extensions: Vec<ExtraFileExtension>,
}

impl HostConfiguration {
    pub fn apply(&mut self, update: HostConfigurationUpdate) {
        if let Some(file) = update.file {
            self.file = Some(file);
        }
        if let Some(host_info) = update.host_info {
            self.host_info = host_info;
        }
        if let Some(format_options) = update.format_options {
            self.format_options = self.format_options.combine_with_default(&format_options, FormatOptions::default());
        }
        if let Some(extensions) = update.extra_file_extensions {
            self.extra_file_extensions = extensions;
        }
    }

    pub fn resolved_format_options(&self) -> &FormatOptions {
        self.format_options.as_ref()
    }

    pub fn script_kind_for_extension(&self, extension: &str) -> Option<ScriptKind> {
        self.extra_file_extensions.iter().find(|e| e.extension == extension).map(|e| e.script_kind.into())
    }
}
