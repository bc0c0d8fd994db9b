use std::net::SocketAddr;

use axum::{Router, routing};
use tracing::info;

use crate::error::{Error, Result};
use crate::node::Node;

mod handlers {
    use super::*;

    use axum::extract;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use serde::{Serialize, Deserialize};

    use crate::account::Address;
    use crate::block::Block;
    use crate::msg::NodeInfo;
    use crate::txn::Transaction;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Balance {
        pub address: Address,
        pub balance: u64,
    }

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = match &self {
                Error::InvalidAddress(_)
                | Error::MissingSignature
                | Error::InvalidSignature
                | Error::SenderMismatch { .. }
                | Error::Serialization(_) => StatusCode::BAD_REQUEST,
                Error::InsufficientBalance { .. } | Error::BalanceOverflow(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::BlockNotFound(_) | Error::UnknownPeer(_) => StatusCode::NOT_FOUND,
                Error::DuplicateTransaction(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, self.to_string()).into_response()
        }
    }

    pub async fn root(extract::State(node): extract::State<Node>) -> String {
        let info = node.node_info().await;
        format!(
"This is node {}.
My peers are {:?}.
Last block applied was {}.
My balance is {}.
I have {} pooled transactions.",
            info.address,
            node.peers().iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            info.last_block,
            node.get_balance(&info.address).await,
            node.pool_len().await
        )
    }

    pub async fn info(extract::State(node): extract::State<Node>) -> Json<NodeInfo> {
        Json(node.node_info().await)
    }

    pub async fn balance(
        extract::State(node): extract::State<Node>,
        extract::Path(address): extract::Path<String>,
    ) -> Result<Json<Balance>> {
        let address: Address = address.parse()?;
        let balance = node.get_balance(&address).await;
        Ok(Json(Balance { address, balance }))
    }

    pub async fn block(
        extract::State(node): extract::State<Node>,
        extract::Path(number): extract::Path<u64>,
    ) -> Result<Json<Block>> {
        Ok(Json(node.get_block_by_number(number).await?))
    }

    pub async fn transaction(
        extract::State(node): extract::State<Node>,
        Json(txn): Json<Transaction>,
    ) -> Result<StatusCode> {
        node.add_transaction(txn).await?;
        Ok(StatusCode::ACCEPTED)
    }
}

pub use handlers::Balance;

pub fn router(node: Node) -> Router {
    Router::new()
        .route("/", routing::get(handlers::root))
        .route("/info", routing::get(handlers::info))
        .route("/balance/:address", routing::get(handlers::balance))
        .route("/block/:number", routing::get(handlers::block))
        .route("/transaction", routing::post(handlers::transaction))
        .with_state(node)
}

/// Serves the client API until the server fails.
pub async fn serve(node: Node, addr: SocketAddr) -> Result<()> {
    info!(node = %node.address(), %addr, "serving client api");
    axum::Server::bind(&addr)
        .serve(router(node).into_make_service())
        .await
        .map_err(|e| Error::Http(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::Json;

    use crate::state::tests::setup;
    use crate::txn::tests::transfer;

    #[tokio::test]
    async fn app() {
        let (kps, genesis) = setup(3, 1, 1_000);
        let node = Node::new(kps[0].clone(), genesis);
        let _ = router(node.clone());

        let Json(info) = handlers::info(State(node.clone())).await;
        assert_eq!(info.address, *node.address());
        assert_eq!(info.last_block, 0);

        let Json(bal) = handlers::balance(State(node.clone()), Path(kps[1].address().to_string()))
            .await
            .unwrap();
        assert_eq!(bal, Balance { address: kps[1].address(), balance: 1_000 });
        let err = handlers::balance(State(node.clone()), Path("nope".to_owned())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let status = handlers::transaction(State(node.clone()), Json(transfer(&kps[1], &kps[2], 10, 1)))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        let mut forged = transfer(&kps[1], &kps[2], 10, 1);
        forged.amount = 999;
        let err = handlers::transaction(State(node.clone()), Json(forged)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = handlers::block(State(node.clone()), Path(1)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        let sealed = node.seal_block().await.unwrap();
        let Json(block) = handlers::block(State(node.clone()), Path(1)).await.unwrap();
        assert_eq!(block, sealed);

        let summary = handlers::root(State(node.clone())).await;
        assert!(summary.contains("Last block applied was 1"));
    }
}
