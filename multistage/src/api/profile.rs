//! Cluster profiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named credential bundle granting a test access to a target cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterProfile {
    /// AWS.
    #[serde(rename = "aws")]
    Aws,
    /// AWS with atomic hosts.
    #[serde(rename = "aws-atomic")]
    AwsAtomic,
    /// AWS with CentOS hosts.
    #[serde(rename = "aws-centos")]
    AwsCentos,
    /// Azure.
    #[serde(rename = "azure4")]
    Azure4,
    /// GCP.
    #[serde(rename = "gcp")]
    Gcp,
    /// GCP, highly available.
    #[serde(rename = "gcp-ha")]
    GcpHa,
    /// GCP with CRI-O.
    #[serde(rename = "gcp-crio")]
    GcpCrio,
    /// libvirt on ppc64le.
    #[serde(rename = "libvirt-ppc64le")]
    LibvirtPpc64le,
    /// libvirt on s390x.
    #[serde(rename = "libvirt-s390x")]
    LibvirtS390x,
    /// OpenStack.
    #[serde(rename = "openstack")]
    OpenStack,
    /// vSphere.
    #[serde(rename = "vsphere")]
    VSphere,
}

impl ClusterProfile {
    /// Returns the profile's configuration name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::AwsAtomic => "aws-atomic",
            Self::AwsCentos => "aws-centos",
            Self::Azure4 => "azure4",
            Self::Gcp => "gcp",
            Self::GcpHa => "gcp-ha",
            Self::GcpCrio => "gcp-crio",
            Self::LibvirtPpc64le => "libvirt-ppc64le",
            Self::LibvirtS390x => "libvirt-s390x",
            Self::OpenStack => "openstack",
            Self::VSphere => "vsphere",
        }
    }

    /// Returns the value exposed to steps as `CLUSTER_TYPE`.
    ///
    /// Variants of the same platform share a cluster type.
    #[must_use]
    pub fn cluster_type(&self) -> &'static str {
        match self {
            Self::Aws | Self::AwsAtomic | Self::AwsCentos => "aws",
            Self::Azure4 => "azure4",
            Self::Gcp | Self::GcpHa | Self::GcpCrio => "gcp",
            Self::LibvirtPpc64le => "libvirt-ppc64le",
            Self::LibvirtS390x => "libvirt-s390x",
            Self::OpenStack => "openstack",
            Self::VSphere => "vsphere",
        }
    }
}

impl fmt::Display for ClusterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
