use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{CSIVolumeSource, Container, EnvVar, Pod, Volume, VolumeMount};
use reef_common::constants::{
    INACCEL_CSI_DRIVER, INACCEL_RESOURCE_PREFIX, INACCEL_VOLUME_MOUNT_PATH, INACCEL_VOLUME_NAME,
};
use reef_common::errors::ReefServiceError;
use reef_common::service::{Annotated, Labeled};

/// Collapses every interior run of characters outside `[0-9A-Za-z]` into a
/// single `-` and trims edge runs, so accelerator images become valid
/// RFC 1123 container names.
fn sanitize_image(image: &str) -> String {
    let mut name = String::with_capacity(image.len());
    let mut pending_dash = false;
    for c in image.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !name.is_empty() {
                name.push('-');
            }
            name.push(c);
            pending_dash = false;
        } else {
            pending_dash = true;
        }
    }
    name
}

/// Init containers injected from one annotation are named after the image
/// (domain prefix stripped) plus the zero-based command index.
fn init_container_name(image: &str, index: usize) -> String {
    let image = image.strip_prefix(INACCEL_RESOURCE_PREFIX).unwrap_or(image);
    format!("{}-{}", sanitize_image(image), index)
}

pub fn is_init_container(container: &Container, image: &str, index: usize) -> bool {
    container.name == init_container_name(image, index)
}

pub fn init_container(image: &str, index: usize, command: &str) -> Container {
    Container {
        name: init_container_name(image, index),
        image: Some(image.to_string()),
        // Literal whitespace split, no shell quoting. Consecutive spaces collapse.
        args: Some(
            command
                .split(' ')
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        ..Default::default()
    }
}

/// Label key in screaming snake case: each separator becomes one `_`, and a
/// `_` is inserted at camel and letter-digit boundaries
/// (`inaccel/fpga.id` -> `INACCEL_FPGA_ID`, `inaccel/fpga1` -> `INACCEL_FPGA_1`).
fn env_var_name(label: &str) -> String {
    let mut name = String::with_capacity(label.len());
    let mut prev: Option<char> = None;
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            if let Some(p) = prev {
                let camel = p.is_ascii_lowercase() && c.is_ascii_uppercase();
                let digit = (p.is_ascii_alphabetic() && c.is_ascii_digit())
                    || (p.is_ascii_digit() && c.is_ascii_alphabetic());
                if camel || digit {
                    name.push('_');
                }
            }
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
        prev = Some(c);
    }
    name
}

pub fn is_env_var(env_var: &EnvVar, label: &str) -> bool {
    env_var.name == env_var_name(label)
}

pub fn env_var(label: &str, value: &str) -> EnvVar {
    EnvVar {
        name: env_var_name(label),
        value: Some(value.to_string()),
        value_from: None,
    }
}

pub fn is_volume(volume: &Volume) -> bool {
    volume.name == INACCEL_VOLUME_NAME
}

pub fn volume() -> Volume {
    Volume {
        name: INACCEL_VOLUME_NAME.to_string(),
        csi: Some(CSIVolumeSource {
            driver: INACCEL_CSI_DRIVER.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn is_volume_mount(volume_mount: &VolumeMount) -> bool {
    volume_mount.name == INACCEL_VOLUME_NAME
}

pub fn volume_mount() -> VolumeMount {
    VolumeMount {
        name: INACCEL_VOLUME_NAME.to_string(),
        mount_path: INACCEL_VOLUME_MOUNT_PATH.to_string(),
        ..Default::default()
    }
}

fn merge_env(container: &mut Container, labels: &BTreeMap<String, String>) {
    for (name, value) in labels
        .iter()
        .filter(|(name, _)| name.starts_with(INACCEL_RESOURCE_PREFIX))
    {
        let env = env_var(name, value);
        let envs = container.env.get_or_insert_with(Vec::new);
        match envs.iter_mut().find(|e| is_env_var(e, name)) {
            Some(existing) => *existing = env,
            None => envs.push(env),
        }
    }
}

fn merge_volume_mount(container: &mut Container) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| is_volume_mount(m)) {
        Some(existing) => *existing = volume_mount(),
        None => mounts.push(volume_mount()),
    }
}

/// Produces the mutated Pod for an admission request. Pure and deterministic:
/// the input is never modified, annotation and label keys are visited in the
/// sorted order their `BTreeMap` guarantees, and re-running the mutation on
/// its own output is a no-op.
pub fn mutate(pod: &Pod) -> Result<Pod, ReefServiceError> {
    let mut pod = pod.clone();
    let annotations = Annotated::annotations(&pod).clone();
    let labels = Labeled::labels(&pod).clone();
    let spec = pod
        .spec
        .as_mut()
        .ok_or("Unable to get spec from Pod in admission request")?;

    // Init containers from annotations. Contributions are cumulative across
    // annotations; an identity match replaces in place, anything else appends.
    for (image, commands) in annotations
        .iter()
        .filter(|(image, _)| image.starts_with(INACCEL_RESOURCE_PREFIX))
    {
        for (index, command) in commands
            .split('\n')
            .filter(|command| !command.is_empty())
            .enumerate()
        {
            let init_containers = spec.init_containers.get_or_insert_with(Vec::new);
            let container = init_container(image, index, command);
            match init_containers
                .iter_mut()
                .find(|c| is_init_container(c, image, index))
            {
                Some(existing) => *existing = container,
                None => init_containers.push(container),
            }
        }
    }

    // Environment variables from labels, on every container and init container.
    for container in spec.containers.iter_mut() {
        merge_env(container, &labels);
    }
    for container in spec.init_containers.iter_mut().flatten() {
        merge_env(container, &labels);
    }

    // Singleton volume mount on every container and init container.
    for container in spec.containers.iter_mut() {
        merge_volume_mount(container);
    }
    for container in spec.init_containers.iter_mut().flatten() {
        merge_volume_mount(container);
    }

    // Singleton CSI volume. Volume names are unique in a valid Pod, but a
    // replayed or hand-built object may carry duplicates; keep exactly one.
    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    match volumes.iter().position(|v| is_volume(v)) {
        Some(index) => {
            volumes[index] = volume();
            let mut next = index + 1;
            while next < volumes.len() {
                if is_volume(&volumes[next]) {
                    volumes.remove(next);
                } else {
                    next += 1;
                }
            }
        }
        None => volumes.push(volume()),
    }

    Ok(pod)
}
