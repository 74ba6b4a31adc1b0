use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembly::{template_file_name, CloudAssembly};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unable to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outputs of deployed stacks, keyed by stack name then output key.
pub type StackOutputs = BTreeMap<String, BTreeMap<String, String>>;

/// Writes one template per stack and the manifest into `directory`.
pub fn write_assembly(directory: &Path, assembly: &CloudAssembly) -> Result<Vec<PathBuf>, Error> {
    fs::create_dir_all(directory).map_err(|source| Error::Io {
        path: directory.display().to_string(),
        source,
    })?;

    let mut written = vec![];
    for stack in assembly.stacks() {
        let contents = stack
            .template
            .to_json()
            .map_err(|error| Error::Serialization(error.to_string()))?;
        let path = directory.join(template_file_name(&stack.name));
        write_file(&path, &contents)?;
        written.push(path);
    }

    let manifest = serde_json::to_string_pretty(&assembly.manifest())
        .map_err(|error| Error::Serialization(error.to_string()))?;
    let path = directory.join("manifest.json");
    write_file(&path, &manifest)?;
    written.push(path);

    return Ok(written);
}

pub fn write_outputs(path: &Path, outputs: &StackOutputs) -> Result<(), Error> {
    let contents = serde_json::to_string_pretty(outputs)
        .map_err(|error| Error::Serialization(error.to_string()))?;
    write_file(path, &contents)
}

fn write_file(path: &Path, contents: &str) -> Result<(), Error> {
    fs::write(path, contents).map_err(|source| Error::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;

    use super::{write_assembly, write_outputs, StackOutputs};
    use crate::config::AppConfig;
    use crate::stacks::app;
    use tempfile::tempdir;

    #[test]
    fn writes_templates_and_manifest() {
        let assembly = app().assemble(&AppConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let out = dir.path().join("cdk.out");

        let written = write_assembly(&out, &assembly).unwrap();
        assert_eq!(5, written.len());

        let template: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("RDSStack.template.json")).unwrap())
                .unwrap();
        assert_eq!(
            "AWS::RDS::DBInstance",
            template["Resources"]["Database"]["Type"]
        );

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("manifest.json")).unwrap()).unwrap();
        assert_eq!(
            "aws:cloudformation:stack",
            manifest["artifacts"]["VPCStack"]["type"]
        );
        assert_eq!(
            "EC2Stack.template.json",
            manifest["artifacts"]["EC2Stack"]["properties"]["templateFile"]
        );
    }

    #[test]
    fn writes_outputs_as_json() {
        let mut outputs: StackOutputs = BTreeMap::new();
        outputs.insert(
            String::from("VPCStack"),
            BTreeMap::from([(String::from("VpcId"), String::from("vpc-123"))]),
        );

        let dir = tempdir().unwrap();
        let path = dir.path().join("outputs.json");
        write_outputs(&path, &outputs).unwrap();

        let written: StackOutputs =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(outputs, written);
    }
}
