use crate::error::DownloaderError;

const OS_RELEASE: &str = "/etc/os-release";

/// Distributions published under another distribution's downloads.
const DISTRO_ID_MAP: &[(&str, &str)] = &[
    ("elementary", "ubuntu"),
    ("fedora", "rhel"),
    ("centos", "rhel"),
    ("mint", "ubuntu"),
    ("opensuse-leap", "sles"),
    ("opensuse", "sles"),
    ("redhat", "rhel"),
];

const DISTRO_VERSION_MAP: &[(&str, &str, &str)] = &[("elementary", "6", "20.04")];

/// Version globs to download targets, per distribution.
const DISTRO_TARGETS: &[(&str, &[(&str, &str)])] = &[
    (
        "ubuntu",
        &[
            ("16.*", "ubuntu1604"),
            ("18.*", "ubuntu1804"),
            ("20.*", "ubuntu2004"),
            ("22.*", "ubuntu2204"),
            ("24.*", "ubuntu2404"),
        ],
    ),
    (
        "debian",
        &[
            ("9", "debian92"),
            ("9.*", "debian92"),
            ("10", "debian10"),
            ("11", "debian11"),
            ("12", "debian12"),
        ],
    ),
    (
        "rhel",
        &[
            ("6", "rhel62"),
            ("6.*", "rhel62"),
            ("7", "rhel73"),
            ("7.*", "rhel73"),
            ("8", "rhel81"),
            ("8.*", "rhel81"),
            ("9", "rhel90"),
            ("9.*", "rhel90"),
        ],
    ),
    (
        "sles",
        &[
            ("10.*", "suse10"),
            ("11.*", "suse11"),
            ("12.*", "suse12"),
            ("13.*", "suse13"),
            ("15.*", "suse15"),
        ],
    ),
    (
        "amzn",
        &[("2018.*", "amzn64"), ("2", "amazon2"), ("2023", "amazon2023")],
    ),
];

/// The download architecture of this machine.
pub fn infer_arch() -> String {
    std::env::consts::ARCH.to_owned()
}

/// The download target of this machine.
pub fn infer_target() -> Result<String, DownloaderError> {
    if cfg!(windows) {
        return Ok("windows".to_owned());
    }

    if cfg!(target_os = "macos") {
        return Ok("macos".to_owned());
    }

    match std::fs::read_to_string(OS_RELEASE) {
        Ok(content) => target_from_os_release(&content),
        Err(err) => Err(DownloaderError::TargetDetection(format!(
            "cannot read {OS_RELEASE} ({err}), pass \"--target\" explicitly"
        ))),
    }
}

fn os_release_value<'a>(content: &'a str, key: &str) -> Option<&'a str> {
    content.lines().find_map(|line| {
        let value = line.trim().strip_prefix(key)?.strip_prefix('=')?;
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        Some(value)
    })
}

fn target_from_os_release(content: &str) -> Result<String, DownloaderError> {
    let os_id = os_release_value(content, "ID").ok_or_else(|| {
        DownloaderError::TargetDetection(format!("no ID in {OS_RELEASE}"))
    })?;
    let mut version_id = os_release_value(content, "VERSION_ID").ok_or_else(|| {
        DownloaderError::TargetDetection(format!("no VERSION_ID in {OS_RELEASE}"))
    })?;

    let mut distro = os_id;
    if let Some((_, mapped)) = DISTRO_ID_MAP.iter().find(|(id, _)| *id == os_id) {
        tracing::info!("Mapping distro \"{}\" to \"{}\"", os_id, mapped);

        if let Some((_, _, mapped_version)) = DISTRO_VERSION_MAP
            .iter()
            .find(|(id, version, _)| *id == os_id && *version == version_id)
        {
            tracing::info!("Mapping version \"{}\" to \"{}\"", version_id, mapped_version);
            version_id = *mapped_version;
        }

        distro = *mapped;
    }

    let distro = distro.to_ascii_lowercase();
    let (_, table) = DISTRO_TARGETS
        .iter()
        .find(|(id, _)| *id == distro)
        .ok_or_else(|| {
            DownloaderError::TargetDetection(format!(
                "no known download target for distribution \"{distro}\""
            ))
        })?;

    for (pattern, target) in table.iter() {
        if glob::Pattern::new(pattern)?.matches(version_id) {
            return Ok((*target).to_owned());
        }
    }

    Err(DownloaderError::TargetDetection(format!(
        "no known download target for {distro} version \"{version_id}\""
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ubuntu_release_maps_to_target() {
        let content = "NAME=\"Ubuntu\"\nVERSION_ID=\"20.04\"\nID=ubuntu\nID_LIKE=debian\n";
        assert_eq!(target_from_os_release(content).unwrap(), "ubuntu2004");
    }

    #[test]
    fn derivative_distro_is_remapped() {
        let content = "ID=elementary\nVERSION_ID=\"6\"\n";
        assert_eq!(target_from_os_release(content).unwrap(), "ubuntu2004");

        let content = "ID=\"centos\"\nVERSION_ID=\"7\"\n";
        assert_eq!(target_from_os_release(content).unwrap(), "rhel73");
    }

    #[test]
    fn id_like_does_not_shadow_id() {
        let content = "ID_LIKE=\"rhel fedora\"\nID=\"amzn\"\nVERSION_ID=\"2\"\n";
        assert_eq!(target_from_os_release(content).unwrap(), "amazon2");
    }

    #[test]
    fn current_releases_and_point_versions_are_known() {
        for (content, expected) in [
            ("ID=ubuntu\nVERSION_ID=\"22.04\"\n", "ubuntu2204"),
            ("ID=ubuntu\nVERSION_ID=\"18.04\"\n", "ubuntu1804"),
            ("ID=\"rhel\"\nVERSION_ID=\"8.4\"\n", "rhel81"),
            ("ID=\"centos\"\nVERSION_ID=\"9\"\n", "rhel90"),
            ("ID=debian\nVERSION_ID=\"12\"\n", "debian12"),
        ] {
            assert_eq!(target_from_os_release(content).unwrap(), expected, "{content}");
        }
    }

    #[test]
    fn unknown_distribution_is_reported() {
        let content = "ID=plan9\nVERSION_ID=4\n";
        let err = target_from_os_release(content).unwrap_err();
        assert!(matches!(err, DownloaderError::TargetDetection(_)));
    }

    #[test]
    fn unknown_version_is_reported() {
        let content = "ID=debian\nVERSION_ID=\"7\"\n";
        assert!(target_from_os_release(content).is_err());
    }
}
