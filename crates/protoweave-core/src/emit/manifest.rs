/// Default file name of the registration manifest
pub const DEFAULT_MANIFEST_NAME: &str = "protoweave.units";

/// Service-loader style list of emitted units, one per line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationManifest {
    units: Vec<String>,
}

impl RegistrationManifest {
    /// Lists every given unit once, keeping the first occurrence
    pub fn from_units<'u>(names: impl IntoIterator<Item = &'u str>) -> Self {
        let mut units: Vec<String> = Vec::new();
        for name in names {
            if !units.iter().any(|u| u == name) {
                units.push(name.to_string());
            }
        }
        Self { units }
    }

    /// Registered units
    pub fn units(&self) -> &[String] {
        &self.units
    }

    /// Returns true if no unit is registered
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Manifest text
    pub fn render(&self) -> String {
        self.units.iter().map(|u| format!("{}\n", u)).collect()
    }
}
