//! Desired Deployment for an `Nginx`.

use super::{non_empty, owned_object_meta, quantity};
use crate::error::ControllerError;
use crds::{
    ANNOTATION_CUSTOM_CONFIG, ConfigKind, Nginx, NginxSpec, owned_labels,
};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment,
};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapVolumeSource, Container, ContainerPort, DownwardAPIVolumeFile,
    DownwardAPIVolumeSource, EmptyDirVolumeSource, ExecAction, KeyToPath, Lifecycle,
    LifecycleHandler, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, SecretVolumeSource,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Name of the nginx container
pub const NGINX_CONTAINER_NAME: &str = "nginx";

/// Where nginx reads its main configuration
pub const CONFIG_MOUNT_PATH: &str = "/etc/nginx/nginx.conf";

/// Parent directory of the per-secret certificate mounts
pub const CERTS_DIR: &str = "/etc/nginx/certs";

/// Where extra files are mounted
pub const EXTRA_FILES_DIR: &str = "/etc/nginx/extra_files";

/// Written by the entrypoint once `nginx -t` passes
const CONFIG_VALIDATED_SENTINEL: &str = "/tmp/done";

/// Ports above the unprivileged range need this capability
const NET_BIND_SERVICE: &str = "NET_BIND_SERVICE";

/// Extra headroom on the cache volume; nginx can exceed `max_size` briefly
/// before the cache manager evicts.
const CACHE_SIZE_HEADROOM: f64 = 1.05;

const CONFIG_VOLUME: &str = "nginx-config";
const EXTRA_FILES_VOLUME: &str = "nginx-extra-files";
const CACHE_VOLUME: &str = "nginx-cache";

/// Build the desired Deployment for `nginx`.
pub fn new_deployment(nginx: &Nginx) -> Result<Deployment, ControllerError> {
    let spec = &nginx.spec;
    let (_, name) = super::identity(nginx)?;
    let selector_labels = owned_labels(&name);

    let metadata = owned_object_meta(nginx, name.clone(), &BTreeMap::new(), &BTreeMap::new())?;

    let mut pod_labels = spec.pod_template.labels.clone();
    pod_labels.extend(selector_labels.clone());

    let mut pod_annotations = spec.pod_template.annotations.clone();
    if let Some(config) = spec.config.as_ref().filter(|c| c.kind == ConfigKind::Inline) {
        pod_annotations.insert(
            ANNOTATION_CUSTOM_CONFIG.to_string(),
            config.value.clone().unwrap_or_default(),
        );
    }

    let (volumes, mounts) = volumes_and_mounts(spec)?;

    let mut containers = vec![nginx_container(spec, mounts)];
    containers.extend(spec.pod_template.containers.iter().cloned());

    let template = &spec.pod_template;
    let pod_spec = PodSpec {
        containers,
        init_containers: non_empty(template.init_containers.clone()),
        volumes: non_empty(volumes),
        affinity: template.affinity.clone(),
        node_selector: non_empty(template.node_selector.clone()),
        tolerations: non_empty(template.tolerations.clone()),
        host_network: template.host_network.then_some(true),
        termination_grace_period_seconds: template.termination_grace_period_seconds,
        security_context: template.pod_security_context.clone(),
        service_account_name: template.service_account_name.clone(),
        topology_spread_constraints: non_empty(template.topology_spread_constraints.clone()),
        ..Default::default()
    };

    Ok(Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            replicas: spec.replicas,
            selector: LabelSelector {
                match_labels: Some(selector_labels),
                ..Default::default()
            },
            strategy: strategy(spec),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: non_empty(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    })
}

/// Rolling update policy: an explicit override wins; host-network pods
/// cannot surge on the same node port, so they trade surge for
/// unavailability at a quarter of the replicas.
fn strategy(spec: &NginxSpec) -> Option<DeploymentStrategy> {
    let rolling_update = if let Some(explicit) = &spec.pod_template.rolling_update {
        explicit.clone()
    } else if spec.pod_template.host_network {
        let replicas = spec.replicas.unwrap_or(1).max(0);
        let quarter = (replicas / 4 + i32::from(replicas % 4 != 0)).max(1);
        RollingUpdateDeployment {
            max_surge: Some(IntOrString::Int(quarter)),
            max_unavailable: Some(IntOrString::Int(quarter)),
        }
    } else {
        return None;
    };

    Some(DeploymentStrategy {
        type_: Some("RollingUpdate".to_string()),
        rolling_update: Some(rolling_update),
    })
}

/// Container ports with `http`/`https` filled in when the user did not
/// declare them.
pub fn container_ports(spec: &NginxSpec) -> Vec<ContainerPort> {
    let mut ports = spec.pod_template.ports.clone();
    let (http, https) = if spec.pod_template.host_network {
        (80, 443)
    } else {
        (8080, 8443)
    };
    for (name, port) in [("http", http), ("https", https)] {
        if !ports.iter().any(|p| p.name.as_deref() == Some(name)) {
            ports.push(ContainerPort {
                name: Some(name.to_string()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        }
    }
    ports
}

fn nginx_container(spec: &NginxSpec, volume_mounts: Vec<VolumeMount>) -> Container {
    let ports = container_ports(spec);

    let mut security_context = spec.pod_template.security_context.clone();
    if ports.iter().any(|p| p.container_port < 1024) {
        let ctx = security_context.get_or_insert_with(SecurityContext::default);
        let capabilities = ctx.capabilities.get_or_insert_with(Capabilities::default);
        let add = capabilities.add.get_or_insert_with(Vec::new);
        if !add.iter().any(|c| c == NET_BIND_SERVICE) {
            add.push(NET_BIND_SERVICE.to_string());
        }
    }

    Container {
        name: NGINX_CONTAINER_NAME.to_string(),
        image: Some(spec.image_or_default().to_string()),
        command: Some(vec!["/bin/sh".to_string(), "-c".to_string()]),
        args: Some(vec![format!(
            "nginx -t && touch {CONFIG_VALIDATED_SENTINEL} && exec nginx -g 'daemon off;'"
        )]),
        readiness_probe: readiness_probe(spec, &ports),
        ports: Some(ports),
        security_context,
        resources: spec.resources.clone(),
        volume_mounts: non_empty(volume_mounts),
        lifecycle: Some(lifecycle(spec)),
        ..Default::default()
    }
}

/// `curl` each enabled scheme on its container port; 1s timeout per scheme.
fn readiness_probe(spec: &NginxSpec, ports: &[ContainerPort]) -> Option<Probe> {
    let path = spec.healthcheck_path.as_deref().filter(|p| !p.is_empty())?;
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    let mut schemes = vec!["http"];
    if !spec.tls.is_empty() {
        schemes.push("https");
    }

    let checks: Vec<String> = schemes
        .iter()
        .filter_map(|scheme| {
            let port = ports.iter().find(|p| p.name.as_deref() == Some(*scheme))?;
            Some(format!(
                "curl -m1 -kfsS -o /dev/null {scheme}://localhost:{}{path}",
                port.container_port
            ))
        })
        .collect();

    Some(Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                checks.join(" && "),
            ]),
        }),
        timeout_seconds: Some(i32::try_from(checks.len()).unwrap_or(i32::MAX)),
        ..Default::default()
    })
}

/// Default postStart waits for the config check; a user postStart runs
/// after it. preStop passes through untouched.
fn lifecycle(spec: &NginxSpec) -> Lifecycle {
    let wait = format!("while ! [ -f {CONFIG_VALIDATED_SENTINEL} ]; do sleep 0.5; done");
    let user_post_start = spec
        .lifecycle
        .as_ref()
        .and_then(|l| l.post_start.as_ref())
        .and_then(|h| h.exec.as_ref())
        .and_then(|e| e.command.clone())
        .filter(|c| !c.is_empty());

    let post_start_command = match user_post_start {
        Some(user) => {
            let mut command = vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!("{wait} && \"$0\" \"$@\""),
            ];
            command.extend(user);
            command
        }
        None => vec!["/bin/sh".to_string(), "-c".to_string(), wait],
    };

    let pre_stop = spec
        .lifecycle
        .as_ref()
        .and_then(|l| l.pre_stop.as_ref())
        .and_then(|h| h.exec.clone())
        .map(|exec| LifecycleHandler {
            exec: Some(exec),
            ..Default::default()
        });

    Lifecycle {
        post_start: Some(LifecycleHandler {
            exec: Some(ExecAction {
                command: Some(post_start_command),
            }),
            ..Default::default()
        }),
        pre_stop,
        ..Default::default()
    }
}

fn volumes_and_mounts(spec: &NginxSpec) -> Result<(Vec<Volume>, Vec<VolumeMount>), ControllerError> {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    // One mount per distinct secret; two entries naming the same secret
    // would otherwise collide on the mount path.
    let mut secrets: Vec<&str> = Vec::new();
    for tls in &spec.tls {
        if !secrets.contains(&tls.secret_name.as_str()) {
            secrets.push(&tls.secret_name);
        }
    }
    for (i, secret) in secrets.iter().enumerate() {
        let volume_name = format!("nginx-certs-{i}");
        volumes.push(Volume {
            name: volume_name.clone(),
            secret: Some(SecretVolumeSource {
                secret_name: Some((*secret).to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: volume_name,
            mount_path: format!("{CERTS_DIR}/{secret}"),
            read_only: Some(true),
            ..Default::default()
        });
    }

    if let Some(config) = &spec.config {
        let volume = match config.kind {
            ConfigKind::ConfigMap => Volume {
                name: CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config.name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ConfigKind::Inline => Volume {
                name: CONFIG_VOLUME.to_string(),
                downward_api: Some(DownwardAPIVolumeSource {
                    items: Some(vec![DownwardAPIVolumeFile {
                        path: "nginx.conf".to_string(),
                        field_ref: Some(ObjectFieldSelector {
                            field_path: format!("metadata.annotations['{ANNOTATION_CUSTOM_CONFIG}']"),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        volumes.push(volume);
        mounts.push(VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            sub_path: Some("nginx.conf".to_string()),
            ..Default::default()
        });
    }

    if let Some(files) = &spec.extra_files {
        // BTreeMap iteration is key-ordered
        let items: Vec<KeyToPath> = files
            .files
            .iter()
            .map(|(key, path)| KeyToPath {
                key: key.clone(),
                path: path.clone(),
                ..Default::default()
            })
            .collect();
        volumes.push(Volume {
            name: EXTRA_FILES_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: files.name.clone(),
                items: non_empty(items),
                ..Default::default()
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: EXTRA_FILES_VOLUME.to_string(),
            mount_path: EXTRA_FILES_DIR.to_string(),
            ..Default::default()
        });
    }

    if let Some(cache) = spec.cache.as_ref().filter(|c| !c.path.is_empty()) {
        let size_limit = cache
            .size
            .as_ref()
            .map(|size| quantity::scale(size, CACHE_SIZE_HEADROOM))
            .transpose()?;
        volumes.push(Volume {
            name: CACHE_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: cache.in_memory.then(|| "Memory".to_string()),
                size_limit,
            }),
            ..Default::default()
        });
        mounts.push(VolumeMount {
            name: CACHE_VOLUME.to_string(),
            mount_path: cache.path.clone(),
            ..Default::default()
        });
    }

    volumes.extend(spec.pod_template.volumes.iter().cloned());
    mounts.extend(spec.pod_template.volume_mounts.iter().cloned());

    Ok((volumes, mounts))
}
