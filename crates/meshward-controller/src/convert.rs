//! Conversion of cluster resources into remote spec shapes
//!
//! Pure functions. Cross-references are looked up in maps of already
//! resolved objects keyed by their object key; a reference missing from the
//! map is an `UnresolvedReference` error.

use crate::error::{ControllerError, Result};
use crate::references::{virtual_node_key, virtual_router_key, virtual_service_key};
use meshward_cloud::types::{
    GatewayRouteMatchData, GatewayRouteRuleData, GatewayRouteSpecData, MeshSpecData, RouteData,
    RouteProtocol, ServiceDiscoveryData, VirtualGatewaySpecData, VirtualNodeSpecData,
    VirtualRouterSpecData, VirtualServiceProviderData, VirtualServiceSpecData, WeightedTargetData,
};
use meshward_core::resources::{HttpRoute, Logging, Route, TcpRoute};
use meshward_core::{
    CoreError, GatewayRoute, Mesh, MeshResource, ObjectKey, VirtualGateway, VirtualNode,
    VirtualRouter, VirtualService,
};
use std::collections::HashMap;

fn lookup<'a, T: MeshResource>(
    resolved: &'a HashMap<ObjectKey, T>,
    key: &ObjectKey,
) -> Result<&'a T> {
    resolved.get(key).ok_or_else(|| {
        ControllerError::unresolved_reference(format!("{} {}", T::KIND.display_name(), key))
    })
}

fn access_log_path(logging: Option<&Logging>) -> Option<String> {
    logging
        .and_then(|l| l.access_log.as_ref())
        .and_then(|a| a.file.as_ref())
        .map(|f| f.path.clone())
}

pub fn mesh_spec(mesh: &Mesh) -> MeshSpecData {
    MeshSpecData {
        egress_filter: mesh.spec.egress_filter.as_ref().map(|f| f.type_),
    }
}

pub fn virtual_node_spec(
    vn: &VirtualNode,
    vs_by_key: &HashMap<ObjectKey, VirtualService>,
) -> Result<VirtualNodeSpecData> {
    let mut backends = Vec::with_capacity(vn.spec.backends.len());
    for backend in &vn.spec.backends {
        let key = virtual_service_key(vn, &backend.virtual_service.virtual_service_ref);
        backends.push(lookup(vs_by_key, &key)?.aws_name());
    }
    // remote backends are a set
    backends.sort_unstable();
    backends.dedup();

    let service_discovery = vn.spec.service_discovery.as_ref().and_then(|sd| {
        if let Some(cm) = &sd.aws_cloud_map {
            Some(ServiceDiscoveryData::AwsCloudMap {
                namespace_name: cm.namespace_name.clone(),
                service_name: cm.service_name.clone(),
                attributes: cm
                    .attributes
                    .iter()
                    .map(|a| (a.key.clone(), a.value.clone()))
                    .collect(),
            })
        } else {
            sd.dns.as_ref().map(|dns| ServiceDiscoveryData::Dns {
                hostname: dns.hostname.clone(),
            })
        }
    });

    Ok(VirtualNodeSpecData {
        listeners: vn.spec.listeners.clone(),
        service_discovery,
        backends,
        access_log_path: access_log_path(vn.spec.logging.as_ref()),
    })
}

pub fn virtual_service_spec(
    vs: &VirtualService,
    vn_by_key: &HashMap<ObjectKey, VirtualNode>,
    vr_by_key: &HashMap<ObjectKey, VirtualRouter>,
) -> Result<VirtualServiceSpecData> {
    let provider = match &vs.spec.provider {
        Some(p) => {
            if let Some(node) = &p.virtual_node {
                let key = virtual_node_key(vs, &node.virtual_node_ref);
                Some(VirtualServiceProviderData::VirtualNode {
                    virtual_node_name: lookup(vn_by_key, &key)?.aws_name(),
                })
            } else if let Some(router) = &p.virtual_router {
                let key = virtual_router_key(vs, &router.virtual_router_ref);
                Some(VirtualServiceProviderData::VirtualRouter {
                    virtual_router_name: lookup(vr_by_key, &key)?.aws_name(),
                })
            } else {
                None
            }
        }
        None => None,
    };
    Ok(VirtualServiceSpecData { provider })
}

fn route_data(
    vr: &VirtualRouter,
    route: &Route,
    vn_by_key: &HashMap<ObjectKey, VirtualNode>,
) -> Result<RouteData> {
    let (protocol, prefix, action) = match (&route.http_route, &route.http2_route, &route.tcp_route)
    {
        (Some(HttpRoute { match_, action }), _, _) => {
            (RouteProtocol::Http, match_.prefix.clone(), action)
        }
        (None, Some(HttpRoute { match_, action }), _) => {
            (RouteProtocol::Http2, match_.prefix.clone(), action)
        }
        (None, None, Some(TcpRoute { action })) => (RouteProtocol::Tcp, None, action),
        (None, None, None) => {
            return Err(CoreError::invalid_resource(
                format!("route {} of virtualRouter {} has no route type", route.name, vr.object_key()),
                "Set one of httpRoute, http2Route or tcpRoute",
            )
            .into())
        }
    };

    let mut weighted_targets = Vec::with_capacity(action.weighted_targets.len());
    for target in &action.weighted_targets {
        let key = virtual_node_key(vr, &target.virtual_node_ref);
        weighted_targets.push(WeightedTargetData {
            virtual_node_name: lookup(vn_by_key, &key)?.aws_name(),
            weight: target.weight,
        });
    }

    Ok(RouteData {
        name: route.name.clone(),
        priority: route.priority,
        protocol,
        prefix,
        weighted_targets,
    })
}

pub fn virtual_router_spec(
    vr: &VirtualRouter,
    vn_by_key: &HashMap<ObjectKey, VirtualNode>,
) -> Result<VirtualRouterSpecData> {
    let routes = vr
        .spec
        .routes
        .iter()
        .map(|route| route_data(vr, route, vn_by_key))
        .collect::<Result<Vec<_>>>()?;
    Ok(VirtualRouterSpecData {
        listeners: vr
            .spec
            .listeners
            .iter()
            .map(|l| l.port_mapping.clone())
            .collect(),
        routes,
    })
}

pub fn virtual_gateway_spec(vg: &VirtualGateway) -> VirtualGatewaySpecData {
    VirtualGatewaySpecData {
        listeners: vg.spec.listeners.clone(),
        access_log_path: access_log_path(vg.spec.logging.as_ref()),
    }
}

pub fn gateway_route_spec(
    gr: &GatewayRoute,
    vs_by_key: &HashMap<ObjectKey, VirtualService>,
) -> Result<GatewayRouteSpecData> {
    let target = |action: &meshward_core::resources::GatewayRouteAction| -> Result<String> {
        let key = virtual_service_key(gr, &action.target.virtual_service.virtual_service_ref);
        Ok(lookup(vs_by_key, &key)?.aws_name())
    };

    let mut rules = Vec::new();
    if let Some(route) = &gr.spec.http_route {
        rules.push(GatewayRouteRuleData {
            match_: GatewayRouteMatchData::Http {
                prefix: route.match_.prefix.clone(),
            },
            target_virtual_service_name: target(&route.action)?,
        });
    }
    if let Some(route) = &gr.spec.http2_route {
        rules.push(GatewayRouteRuleData {
            match_: GatewayRouteMatchData::Http2 {
                prefix: route.match_.prefix.clone(),
            },
            target_virtual_service_name: target(&route.action)?,
        });
    }
    if let Some(route) = &gr.spec.grpc_route {
        rules.push(GatewayRouteRuleData {
            match_: GatewayRouteMatchData::Grpc {
                service_name: route.match_.service_name.clone(),
            },
            target_virtual_service_name: target(&route.action)?,
        });
    }
    Ok(GatewayRouteSpecData { rules })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshward_core::resources::{
        AccessLog, Backend, EgressFilter, EgressFilterType, FileAccessLog, HttpRouteMatch,
        RouteAction, VirtualNodeReference, VirtualNodeServiceProvider, VirtualServiceBackend,
        VirtualServiceProvider, VirtualServiceReference, WeightedTarget,
    };

    fn make_vs(ns: &str, name: &str) -> VirtualService {
        let mut vs = VirtualService::default();
        vs.metadata.name = Some(name.to_string());
        vs.metadata.namespace = Some(ns.to_string());
        vs
    }

    fn make_vn(ns: &str, name: &str) -> VirtualNode {
        let mut vn = VirtualNode::default();
        vn.metadata.name = Some(name.to_string());
        vn.metadata.namespace = Some(ns.to_string());
        vn
    }

    #[test]
    fn test_mesh_egress_filter() {
        let mut mesh = Mesh::default();
        assert_eq!(mesh_spec(&mesh), MeshSpecData::default());

        mesh.spec.egress_filter = Some(EgressFilter {
            type_: EgressFilterType::AllowAll,
        });
        assert_eq!(
            mesh_spec(&mesh).egress_filter,
            Some(EgressFilterType::AllowAll)
        );
    }

    #[test]
    fn test_virtual_node_backends_use_remote_names() {
        let mut vn = make_vn("shop", "frontend");
        vn.spec.backends.push(Backend {
            virtual_service: VirtualServiceBackend {
                virtual_service_ref: VirtualServiceReference {
                    namespace: None,
                    name: "catalog".to_string(),
                },
            },
        });
        vn.spec.logging = Some(Logging {
            access_log: Some(AccessLog {
                file: Some(FileAccessLog {
                    path: "/dev/stdout".to_string(),
                }),
            }),
        });

        let mut resolved = HashMap::new();
        let vs = make_vs("shop", "catalog");
        resolved.insert(vs.object_key(), vs);

        let spec = virtual_node_spec(&vn, &resolved).unwrap();
        assert_eq!(spec.backends, vec!["catalog_shop".to_string()]);
        assert_eq!(spec.access_log_path.as_deref(), Some("/dev/stdout"));

        let err = virtual_node_spec(&vn, &HashMap::new()).unwrap_err();
        assert!(matches!(err, ControllerError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_virtual_node_backends_sorted_and_deduped() {
        let mut vn = make_vn("shop", "frontend");
        for name in ["payments", "catalog", "payments"] {
            vn.spec.backends.push(Backend {
                virtual_service: VirtualServiceBackend {
                    virtual_service_ref: VirtualServiceReference {
                        namespace: None,
                        name: name.to_string(),
                    },
                },
            });
        }

        let mut resolved = HashMap::new();
        for name in ["catalog", "payments"] {
            let vs = make_vs("shop", name);
            resolved.insert(vs.object_key(), vs);
        }

        let spec = virtual_node_spec(&vn, &resolved).unwrap();
        assert_eq!(spec.backends, vec!["catalog_shop", "payments_shop"]);
    }

    #[test]
    fn test_virtual_node_without_backends_has_empty_list() {
        let vn = make_vn("shop", "frontend");
        let spec = virtual_node_spec(&vn, &HashMap::new()).unwrap();
        assert!(spec.backends.is_empty());
        assert!(spec.service_discovery.is_none());
    }

    #[test]
    fn test_virtual_service_node_provider() {
        let mut vs = make_vs("shop", "catalog");
        vs.spec.provider = Some(VirtualServiceProvider {
            virtual_node: Some(VirtualNodeServiceProvider {
                virtual_node_ref: VirtualNodeReference {
                    namespace: None,
                    name: "catalog-v1".to_string(),
                },
            }),
            virtual_router: None,
        });
        let mut nodes = HashMap::new();
        let vn = make_vn("shop", "catalog-v1");
        nodes.insert(vn.object_key(), vn);

        let spec = virtual_service_spec(&vs, &nodes, &HashMap::new()).unwrap();
        assert_eq!(
            spec.provider,
            Some(VirtualServiceProviderData::VirtualNode {
                virtual_node_name: "catalog-v1_shop".to_string()
            })
        );
    }

    #[test]
    fn test_router_routes() {
        let mut vr = VirtualRouter::default();
        vr.metadata.name = Some("catalog".to_string());
        vr.metadata.namespace = Some("shop".to_string());
        vr.spec.routes.push(Route {
            name: "default".to_string(),
            priority: Some(1),
            http_route: Some(HttpRoute {
                match_: HttpRouteMatch {
                    prefix: Some("/".to_string()),
                },
                action: RouteAction {
                    weighted_targets: vec![WeightedTarget {
                        virtual_node_ref: VirtualNodeReference {
                            namespace: None,
                            name: "catalog-v1".to_string(),
                        },
                        weight: 100,
                    }],
                },
            }),
            http2_route: None,
            tcp_route: None,
        });
        let mut nodes = HashMap::new();
        let vn = make_vn("shop", "catalog-v1");
        nodes.insert(vn.object_key(), vn);

        let spec = virtual_router_spec(&vr, &nodes).unwrap();
        assert_eq!(spec.routes.len(), 1);
        assert_eq!(spec.routes[0].protocol, RouteProtocol::Http);
        assert_eq!(spec.routes[0].prefix.as_deref(), Some("/"));
        assert_eq!(spec.routes[0].weighted_targets[0].virtual_node_name, "catalog-v1_shop");

        vr.spec.routes[0].http_route = None;
        assert!(matches!(
            virtual_router_spec(&vr, &nodes),
            Err(ControllerError::Core(CoreError::InvalidResource { .. }))
        ));
    }
}
