//! Typed client handle over the daemon socket

use std::path::Path;

use tokio::net::UnixStream;

use crate::ns::NsType;
use crate::protocol::{
    self, GetCheckpointRequest, GetCheckpointResponse, GetNamespaceRequest, GetNamespaceResponse,
    PutNamespaceRequest, PutNamespaceResponse, ServiceType, METHOD_GET_CHECKPOINT,
    METHOD_GET_NAMESPACE, METHOD_PUT_NAMESPACE,
};
use crate::Result;

/// One connection to the daemon. Requests on a single client are sequential;
/// open one client per concurrent caller.
#[derive(Debug)]
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(socket: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket).await?;
        Ok(Self { stream })
    }

    /// Lease a pre-warmed namespace slot.
    pub async fn get_namespace(
        &mut self,
        t: NsType,
        arg: Option<String>,
    ) -> Result<GetNamespaceResponse> {
        self.call(
            ServiceType::Namespace,
            METHOD_GET_NAMESPACE,
            &GetNamespaceRequest {
                t: t.to_string(),
                arg,
            },
        )
        .await
    }

    /// Return a namespace slot to its pool.
    pub async fn put_namespace(&mut self, t: NsType, id: usize) -> Result<PutNamespaceResponse> {
        self.call(
            ServiceType::Namespace,
            METHOD_PUT_NAMESPACE,
            &PutNamespaceRequest {
                t: t.to_string(),
                id,
            },
        )
        .await
    }

    /// Materialise (or look up) the checkpoint tree for `reference`.
    pub async fn get_checkpoint(&mut self, reference: &str) -> Result<GetCheckpointResponse> {
        self.call(
            ServiceType::Checkpoint,
            METHOD_GET_CHECKPOINT,
            &GetCheckpointRequest {
                reference: reference.to_string(),
            },
        )
        .await
    }

    async fn call<Req, Rsp>(&mut self, service: ServiceType, method: &str, req: &Req) -> Result<Rsp>
    where
        Req: serde::Serialize,
        Rsp: serde::de::DeserializeOwned,
    {
        protocol::write_frame(&mut self.stream, &service).await?;
        protocol::write_frame(&mut self.stream, method).await?;
        protocol::write_frame(&mut self.stream, req).await?;
        protocol::expect_frame(&mut self.stream).await
    }
}
