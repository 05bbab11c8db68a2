use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Container, Pod, Volume};
use kube::ResourceExt;

pub trait Annotated {
    fn annotations(&self) -> &BTreeMap<String, String>;

    fn annotation(&self, annotation: &str) -> Option<&String> {
        self.annotations().get(annotation)
    }
}

pub trait Labeled {
    fn labels(&self) -> &BTreeMap<String, String>;

    fn label(&self, label: &str) -> Option<&String> {
        self.labels().get(label)
    }
}

impl Annotated for Pod {
    fn annotations(&self) -> &BTreeMap<String, String> {
        ResourceExt::annotations(self)
    }
}

impl Labeled for Pod {
    fn labels(&self) -> &BTreeMap<String, String> {
        ResourceExt::labels(self)
    }
}

pub fn containers(pod: &Pod) -> Option<&Vec<Container>> {
    pod.spec.as_ref().map(|spec| &spec.containers)
}

pub fn init_containers(pod: &Pod) -> Option<&Vec<Container>> {
    pod.spec.as_ref().and_then(|spec| spec.init_containers.as_ref())
}

pub fn volumes(pod: &Pod) -> Option<&Vec<Volume>> {
    pod.spec.as_ref().and_then(|spec| spec.volumes.as_ref())
}

pub fn volume_names(pod: &Pod) -> Option<Vec<String>> {
    volumes(pod).map(|vs| vs.iter().map(|v| v.name.clone()).collect())
}
