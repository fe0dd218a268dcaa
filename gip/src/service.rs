//! gRPC service implementation for the IPTables service.
//!
//! Wires the tonic-generated trait to [`RuleBuilder`]. Authentication has
//! already happened by the time a handler runs.

use tonic::{Request, Response, Status};
use tracing::{error, info};

use crate::error::RuleError;
use crate::proto::ip_tables_server::IpTables;
use crate::proto::{AcceptReply, AcceptRequest, FlushRequest, PolicyRequest, Respond};
use crate::rules::{Chain, Policy, RuleBuilder};

/// Rule-management handlers.
#[derive(Clone)]
pub struct IpTablesService {
    rules: RuleBuilder,
}

impl IpTablesService {
    pub fn new(rules: RuleBuilder) -> Self {
        Self { rules }
    }
}

/// Map a rule failure to a status. Bad requests never reached iptables;
/// execution failures carry the command output.
fn rule_status(rpc: &str, err: RuleError) -> Status {
    if err.is_invalid_request() {
        Status::invalid_argument(err.to_string())
    } else {
        error!("{rpc} failed: {err}");
        Status::internal(err.to_string())
    }
}

#[tonic::async_trait]
impl IpTables for IpTablesService {
    // ------------------------------------------------------------------
    // CreateAcceptRule
    // ------------------------------------------------------------------
    async fn create_accept_rule(
        &self,
        request: Request<AcceptRequest>,
    ) -> Result<Response<AcceptReply>, Status> {
        let req = request.into_inner();
        info!(input = %req.input, output = %req.output, "gRPC CreateAcceptRule");

        self.rules
            .accept_forward(&req.input, &req.output)
            .await
            .map_err(|e| rule_status("CreateAcceptRule", e))?;
        Ok(Response::new(AcceptReply {}))
    }

    // ------------------------------------------------------------------
    // CreateAcceptWithState
    // ------------------------------------------------------------------
    async fn create_accept_with_state(
        &self,
        request: Request<AcceptRequest>,
    ) -> Result<Response<AcceptReply>, Status> {
        let req = request.into_inner();
        info!(input = %req.input, output = %req.output, "gRPC CreateAcceptWithState");

        self.rules
            .accept_established(&req.input, &req.output)
            .await
            .map_err(|e| rule_status("CreateAcceptWithState", e))?;
        Ok(Response::new(AcceptReply {}))
    }

    // ------------------------------------------------------------------
    // DropForward
    // ------------------------------------------------------------------
    async fn drop_forward(
        &self,
        request: Request<FlushRequest>,
    ) -> Result<Response<Respond>, Status> {
        let req = request.into_inner();
        info!(chain = %req.chain, "gRPC DropForward");

        let chain: Chain = req
            .chain
            .parse()
            .map_err(|e| rule_status("DropForward", e))?;
        self.rules
            .flush_chain(chain)
            .await
            .map_err(|e| rule_status("DropForward", e))?;
        Ok(Response::new(Respond {}))
    }

    // ------------------------------------------------------------------
    // SetDefaultPolicy
    // ------------------------------------------------------------------
    async fn set_default_policy(
        &self,
        request: Request<PolicyRequest>,
    ) -> Result<Response<Respond>, Status> {
        let req = request.into_inner();
        info!(chain = %req.chain, policy = %req.policy, "gRPC SetDefaultPolicy");

        let chain: Chain = req
            .chain
            .parse()
            .map_err(|e| rule_status("SetDefaultPolicy", e))?;
        let policy: Policy = req
            .policy
            .parse()
            .map_err(|e| rule_status("SetDefaultPolicy", e))?;
        self.rules
            .set_default_policy(chain, policy)
            .await
            .map_err(|e| rule_status("SetDefaultPolicy", e))?;
        Ok(Response::new(Respond {}))
    }
}
