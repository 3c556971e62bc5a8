use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(unix)]
use std::path::PathBuf;

use beacon_core::config::BindTarget;
use beacon_core::error::ServerError;
use tokio::net::lookup_host;

/// 绑定目标解析后的落点：具体 IP 套接字地址或 Unix 域路径。
#[derive(Debug)]
pub(crate) enum ResolvedTarget {
    Ip(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

/// 把配置层的 [`BindTarget`] 解析为可直接绑定的地址。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 配置层保持纯数据，主机名解析推迟到绑定阶段执行，解析失败
///   归入绑定错误域（`Resolve`）。
///
/// ## 逻辑 (How)
/// - 空主机名视为绑定全部网卡（`0.0.0.0`）；
/// - IP 字面量走快速路径，不触发 DNS；
/// - 其余主机名经 `tokio::net::lookup_host` 解析，取首个结果；
///   解析结果为空同样报 `Resolve`。
///
/// ## 契约 (What)
/// - **前置条件**：在 Tokio 运行时内调用；
/// - **后置条件**：返回的地址可直接交给套接字绑定，Unix 路径原样
///   透传。
pub(crate) async fn resolve_bind_target(target: &BindTarget) -> Result<ResolvedTarget, ServerError> {
    match target {
        BindTarget::Ip { host, port } => {
            if host.is_empty() {
                return Ok(ResolvedTarget::Ip(SocketAddr::new(
                    IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    *port,
                )));
            }
            if let Ok(ip) = host.parse::<IpAddr>() {
                return Ok(ResolvedTarget::Ip(SocketAddr::new(ip, *port)));
            }
            let mut addrs =
                lookup_host((host.as_str(), *port))
                    .await
                    .map_err(|source| ServerError::Resolve {
                        host: host.clone(),
                        source,
                    })?;
            match addrs.next() {
                Some(addr) => Ok(ResolvedTarget::Ip(addr)),
                None => Err(ServerError::Resolve {
                    host: host.clone(),
                    source: io::Error::new(
                        io::ErrorKind::NotFound,
                        "resolution yielded no addresses",
                    ),
                }),
            }
        }
        #[cfg(unix)]
        BindTarget::Unix { path } => Ok(ResolvedTarget::Unix(path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 空主机名解析为全网卡通配地址，且保留端口。
    #[tokio::test]
    async fn empty_host_means_all_interfaces() {
        let target = BindTarget::ip("", 7001);
        match resolve_bind_target(&target).await {
            Ok(ResolvedTarget::Ip(addr)) => {
                assert!(addr.ip().is_unspecified(), "空主机名必须落在通配地址");
                assert_eq!(addr.port(), 7001);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    /// IP 字面量不触发 DNS，原样落地。
    #[tokio::test]
    async fn ip_literal_takes_the_fast_path() {
        let target = BindTarget::ip("127.0.0.1", 0);
        match resolve_bind_target(&target).await {
            Ok(ResolvedTarget::Ip(addr)) => {
                assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
                assert_eq!(addr.port(), 0);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
    }

    /// 无法解析的主机名必须归入 `Resolve` 错误域。
    #[tokio::test]
    async fn bogus_hostname_maps_to_resolve_error() {
        let target = BindTarget::ip("definitely-not-a-real-host.invalid", 80);
        match resolve_bind_target(&target).await {
            Err(ServerError::Resolve { host, .. }) => {
                assert_eq!(host, "definitely-not-a-real-host.invalid");
            }
            other => panic!("expected Resolve error, got {other:?}"),
        }
    }
}
