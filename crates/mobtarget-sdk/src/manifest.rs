//! `Info.plist` generation.
//!
//! The manifest is either copied from a caller-authored override or
//! synthesized from defaults. In both cases the platform keys
//! (`DTPlatformName`, `DTPlatformVersion`, `DTSDKName`) come from the bound
//! SDK, and a per-variant customization closure gets the last word on
//! everything else.

use std::fs;
use std::path::{Path, PathBuf};

use plist::{Dictionary, Value};

use crate::sdk::Sdk;
use crate::types::{DeployError, Result, Variant};

/// File name of the manifest inside the bundle.
pub const INFO_PLIST: &str = "Info.plist";

/// Name of the resource rules file referenced by device manifests.
pub const RESOURCE_RULES_PLIST: &str = "ResourceRules.plist";

const ORIENTATIONS: [&str; 4] = [
    "UIInterfaceOrientationPortrait",
    "UIInterfaceOrientationLandscapeLeft",
    "UIInterfaceOrientationLandscapeRight",
    "UIInterfaceOrientationPortraitUpsideDown",
];

/// Values used when no override manifest is supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDefaults {
    pub executable_name: String,
    /// Becomes `CFBundleIdentifier`; the executable name is used when unset.
    pub main_identifier: Option<String>,
}

/// Parses a caller-supplied override manifest.
///
/// Accepts both XML and binary property lists.
pub fn load_override(path: &Path) -> Result<Dictionary> {
    let value = Value::from_file(path).map_err(|e| {
        DeployError::Config(format!(
            "Failed to parse Info.plist override {}: {}",
            path.display(),
            e
        ))
    })?;
    value.into_dictionary().ok_or_else(|| {
        DeployError::Config(format!(
            "Info.plist override {} must contain a dictionary at the top level",
            path.display()
        ))
    })
}

/// Converts the SDK's `SUPPORTED_DEVICE_FAMILIES` into `UIDeviceFamily` numbers.
///
/// The SDK stores the families as strings, either as an array (`["1", "2"]`)
/// or as a single comma-separated string (`"1,2"`); the manifest wants
/// integers. Entries that are not numbers are dropped.
pub fn device_families(sdk: &Sdk) -> Option<Vec<Value>> {
    let raw: Vec<String> = match sdk.default_property("SUPPORTED_DEVICE_FAMILIES")? {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Integer(i) => Some(i.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return None,
    };
    Some(
        raw.iter()
            .filter_map(|s| s.trim().parse::<i64>().ok())
            .map(Value::from)
            .collect(),
    )
}

fn orientations() -> Value {
    Value::Array(
        ORIENTATIONS
            .iter()
            .map(|o| Value::String((*o).to_string()))
            .collect(),
    )
}

fn default_manifest(defaults: &ManifestDefaults, sdk: &Sdk) -> Dictionary {
    let mut dict = Dictionary::new();
    let exe = defaults.executable_name.clone();
    let identifier = defaults
        .main_identifier
        .clone()
        .unwrap_or_else(|| exe.clone());

    dict.insert("CFBundleExecutable".to_string(), Value::String(exe.clone()));
    dict.insert("CFBundleName".to_string(), Value::String(exe));
    dict.insert("CFBundleIdentifier".to_string(), Value::String(identifier));
    dict.insert(
        "CFBundlePackageType".to_string(),
        Value::String("APPL".to_string()),
    );
    dict.insert("LSRequiresIPhoneOS".to_string(), Value::Boolean(true));
    if let Some(families) = device_families(sdk) {
        dict.insert("UIDeviceFamily".to_string(), Value::Array(families));
    }
    dict.insert("UISupportedInterfaceOrientations".to_string(), orientations());
    dict.insert(
        "UISupportedInterfaceOrientations~ipad".to_string(),
        orientations(),
    );
    dict.insert(
        "UIRequiredDeviceCapabilities".to_string(),
        Value::Array(vec![Value::String("armv7".to_string())]),
    );
    dict
}

fn apply_platform_keys(dict: &mut Dictionary, sdk: &Sdk) {
    let platform = sdk
        .platform_name()
        .map(str::to_string)
        .unwrap_or_else(|| sdk.variant().platform_name().to_lowercase());
    dict.insert("DTPlatformName".to_string(), Value::String(platform));
    dict.insert(
        "DTPlatformVersion".to_string(),
        Value::String(sdk.version().to_string()),
    );
    dict.insert(
        "DTSDKName".to_string(),
        Value::String(sdk.canonical_name().to_string()),
    );
}

/// Builds the manifest dictionary without writing it.
///
/// `customize` runs after the platform keys are set; the platform keys are
/// applied once more afterwards so neither the override nor the closure can
/// shadow them.
pub fn build_manifest<F>(
    override_dict: Option<&Dictionary>,
    defaults: &ManifestDefaults,
    sdk: &Sdk,
    customize: F,
) -> Dictionary
where
    F: FnOnce(&mut Dictionary),
{
    let mut dict = match override_dict {
        Some(source) => source.clone(),
        None => default_manifest(defaults, sdk),
    };
    apply_platform_keys(&mut dict, sdk);
    customize(&mut dict);
    apply_platform_keys(&mut dict, sdk);
    dict
}

/// Customization for a bundle variant.
///
/// Simulator bundles declare the simulator platform; device bundles declare
/// the device platform and reference the resource rules file.
pub fn customize_for(variant: Variant) -> impl FnOnce(&mut Dictionary) {
    move |dict: &mut Dictionary| {
        if variant == Variant::Device {
            dict.insert(
                "CFBundleResourceSpecification".to_string(),
                Value::String(RESOURCE_RULES_PLIST.to_string()),
            );
        }
        dict.insert(
            "CFBundleSupportedPlatforms".to_string(),
            Value::Array(vec![Value::String(variant.platform_name().to_string())]),
        );
    }
}

/// Writes `Info.plist` into `install_dir` in binary encoding.
///
/// Output is a pure function of the inputs: identical inputs produce
/// identical bytes.
pub fn materialize<F>(
    install_dir: &Path,
    override_dict: Option<&Dictionary>,
    sdk: &Sdk,
    defaults: &ManifestDefaults,
    customize: F,
) -> Result<PathBuf>
where
    F: FnOnce(&mut Dictionary),
{
    let dict = build_manifest(override_dict, defaults, sdk, customize);
    fs::create_dir_all(install_dir).map_err(|e| DeployError::io(install_dir, e))?;
    let dest = install_dir.join(INFO_PLIST);
    tracing::debug!("Installing {} to {}", INFO_PLIST, install_dir.display());
    Value::Dictionary(dict)
        .to_file_binary(&dest)
        .map_err(|e| DeployError::plist(&dest, e))?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::SdkRegistry;
    use crate::sdk::testing::write_fake_sdk;

    fn device_sdk() -> (tempfile::TempDir, Sdk) {
        let dir = tempfile::tempdir().unwrap();
        write_fake_sdk(dir.path(), Variant::Device, "8.1");
        let sdk = SdkRegistry::new(dir.path())
            .resolve(Variant::Device, None)
            .unwrap();
        (dir, sdk)
    }

    fn defaults() -> ManifestDefaults {
        ManifestDefaults {
            executable_name: "Hello".to_string(),
            main_identifier: None,
        }
    }

    fn string<'a>(dict: &'a Dictionary, key: &str) -> Option<&'a str> {
        dict.get(key).and_then(Value::as_string)
    }

    #[test]
    fn test_defaults_contain_package_type_and_platform_keys() {
        let (_dir, sdk) = device_sdk();
        let dict = build_manifest(None, &defaults(), &sdk, |_| {});
        assert_eq!(string(&dict, "CFBundlePackageType"), Some("APPL"));
        assert_eq!(string(&dict, "CFBundleExecutable"), Some("Hello"));
        assert_eq!(string(&dict, "CFBundleIdentifier"), Some("Hello"));
        assert_eq!(dict.get("LSRequiresIPhoneOS"), Some(&Value::Boolean(true)));
        assert_eq!(string(&dict, "DTPlatformName"), Some("iphoneos"));
        assert_eq!(string(&dict, "DTPlatformVersion"), Some("8.1"));
        assert_eq!(string(&dict, "DTSDKName"), Some("iphoneos8.1"));
    }

    #[test]
    fn test_main_identifier_becomes_bundle_identifier() {
        let (_dir, sdk) = device_sdk();
        let defaults = ManifestDefaults {
            executable_name: "Hello".to_string(),
            main_identifier: Some("com.example.Hello".to_string()),
        };
        let dict = build_manifest(None, &defaults, &sdk, |_| {});
        assert_eq!(string(&dict, "CFBundleIdentifier"), Some("com.example.Hello"));
    }

    #[test]
    fn test_device_families_are_numbers() {
        let (_dir, sdk) = device_sdk();
        let dict = build_manifest(None, &defaults(), &sdk, |_| {});
        assert_eq!(
            dict.get("UIDeviceFamily"),
            Some(&Value::Array(vec![Value::from(1i64), Value::from(2i64)]))
        );
    }

    #[test]
    fn test_hook_adds_keys_without_removing_orientations() {
        let (_dir, sdk) = device_sdk();
        let dict = build_manifest(None, &defaults(), &sdk, customize_for(Variant::Simulator));
        assert_eq!(
            dict.get("CFBundleSupportedPlatforms"),
            Some(&Value::Array(vec![Value::String("iPhoneSimulator".into())]))
        );
        assert_eq!(dict.get("UISupportedInterfaceOrientations"), Some(&orientations()));
        assert_eq!(
            dict.get("UISupportedInterfaceOrientations~ipad"),
            Some(&orientations())
        );
        assert_eq!(string(&dict, "CFBundlePackageType"), Some("APPL"));
        assert!(dict.get("CFBundleResourceSpecification").is_none());
    }

    #[test]
    fn test_device_hook_references_resource_rules() {
        let (_dir, sdk) = device_sdk();
        let dict = build_manifest(None, &defaults(), &sdk, customize_for(Variant::Device));
        assert_eq!(
            string(&dict, "CFBundleResourceSpecification"),
            Some("ResourceRules.plist")
        );
    }

    #[test]
    fn test_override_is_preserved_and_platform_keys_win() {
        let (_dir, sdk) = device_sdk();
        let mut source = Dictionary::new();
        source.insert("Foo".to_string(), Value::String("Bar".to_string()));
        source.insert("DTSDKName".to_string(), Value::String("bogus".to_string()));
        source.insert(
            "CFBundleExecutable".to_string(),
            Value::String("Custom".to_string()),
        );

        let dict = build_manifest(Some(&source), &defaults(), &sdk, |_| {});
        assert_eq!(string(&dict, "Foo"), Some("Bar"));
        assert_eq!(string(&dict, "CFBundleExecutable"), Some("Custom"));
        assert_eq!(string(&dict, "DTSDKName"), Some("iphoneos8.1"));
        assert!(dict.get("CFBundlePackageType").is_none());
    }

    #[test]
    fn test_hook_cannot_shadow_platform_keys() {
        let (_dir, sdk) = device_sdk();
        let dict = build_manifest(None, &defaults(), &sdk, |d: &mut Dictionary| {
            d.insert("DTPlatformVersion".to_string(), Value::String("0.0".into()));
            d.insert("Extra".to_string(), Value::Boolean(true));
        });
        assert_eq!(string(&dict, "DTPlatformVersion"), Some("8.1"));
        assert_eq!(dict.get("Extra"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_materialize_writes_reproducible_binary_plist() {
        let (_dir, sdk) = device_sdk();
        let out = tempfile::tempdir().unwrap();
        let app = out.path().join("Hello.app");

        let first = materialize(&app, None, &sdk, &defaults(), customize_for(Variant::Device))
            .unwrap();
        let bytes = fs::read(&first).unwrap();
        assert!(bytes.starts_with(b"bplist00"));

        let second = materialize(&app, None, &sdk, &defaults(), customize_for(Variant::Device))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(bytes, fs::read(&second).unwrap());

        let parsed = load_override(&first).unwrap();
        assert_eq!(string(&parsed, "CFBundleName"), Some("Hello"));
    }

    #[test]
    fn test_load_override_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Info.plist");
        fs::write(&path, "not a plist").unwrap();
        let err = load_override(&path).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_comma_separated_families() {
        let dir = tempfile::tempdir().unwrap();
        let root = write_fake_sdk(dir.path(), Variant::Device, "8.1");
        let settings = root.join("SDKSettings.plist");
        let mut value = Value::from_file(&settings).unwrap();
        let defaults = value
            .as_dictionary_mut()
            .and_then(|d| d.get_mut("DefaultProperties"))
            .and_then(Value::as_dictionary_mut)
            .unwrap();
        defaults.insert(
            "SUPPORTED_DEVICE_FAMILIES".to_string(),
            Value::String("1, 2".to_string()),
        );
        value.to_file_xml(&settings).unwrap();

        let sdk = Sdk::from_dir(&root, Variant::Device).unwrap();
        assert_eq!(
            device_families(&sdk),
            Some(vec![Value::from(1i64), Value::from(2i64)])
        );
    }
}
