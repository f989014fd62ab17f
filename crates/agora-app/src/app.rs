// FORUM APPLICATION: ForumApp
// Wires admission, moderation voting, proposal handling, staging, commit and queries
// behind the host callback surface.
//
// SAFETY INVARIANTS:
// 1. The registry, staging buffer and store are explicit handles owned here
// 2. A failed commit or an undecodable validator key latches the halted flag;
//    no consensus call succeeds afterwards
// 3. Locally signalled words only reach a block through majority ratification

use crate::abci::*;
use crate::application::{AppError, Application};
use crate::config::AppConfig;
use crate::query::QueryService;
use agora_consensus::{
    extension_payload, verify_proposal, AdmissionChecker, CommitApplier, CommitOutcome,
    ProposalBuilder, StagingBuffer, ValidatorRegistry, VoteExtension, VoteExtensionAggregator,
};
use agora_core::{
    ForumError, ModerationWordSet, ResponseCode, APP_VERSION, MAX_EXTENSION_WORDS, PROTOCOL_VERSION,
};
use agora_state::{ForumStore, WriteSet};
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Height from which the host must attach vote extensions.
const VOTE_EXTENSIONS_ENABLE_HEIGHT: u64 = 1;

/// The application's slice of the genesis document.
#[derive(Debug, Default, Deserialize)]
struct GenesisState {
    #[serde(default)]
    moderation_words: Vec<String>,
}

pub struct ForumApp {
    store: Arc<dyn ForumStore>,
    registry: Arc<ValidatorRegistry>,
    admission: AdmissionChecker,
    aggregator: VoteExtensionAggregator,
    builder: ProposalBuilder,
    applier: CommitApplier,
    queries: QueryService,
    staging: Mutex<StagingBuffer>,

    /// Words this replica signals in ExtendVote on top of the durable set
    local_words: RwLock<ModerationWordSet>,
    halted: AtomicBool,
}

impl ForumApp {
    pub fn new(store: Arc<dyn ForumStore>, config: &AppConfig) -> Self {
        let registry = Arc::new(ValidatorRegistry::new());
        ForumApp {
            admission: AdmissionChecker::new(store.clone()),
            aggregator: VoteExtensionAggregator::new(registry.clone()),
            builder: ProposalBuilder::new(store.clone()),
            applier: CommitApplier::new(store.clone()),
            queries: QueryService::new(store.clone(), registry.clone()),
            staging: Mutex::new(StagingBuffer::new()),
            local_words: RwLock::new(ModerationWordSet::from_words(&config.moderation_words)),
            halted: AtomicBool::new(false),
            store,
            registry,
        }
    }

    /// Validate `config`, open its store and build the application.
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        let store = config.open_store()?;
        Ok(Self::new(store, config))
    }

    /// Operator signal: add words this validator proposes for moderation.
    ///
    /// Returns how many were new. The words take effect only once a majority
    /// of validators signals them.
    pub fn signal_moderation_words<I, S>(&self, words: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut local = self.local_words.write();
        let added = words
            .into_iter()
            .filter(|w| local.insert(w.as_ref()))
            .count();
        info!("Signalling {} new moderation words ({} total)", added, local.len());
        added
    }

    pub fn registry(&self) -> &Arc<ValidatorRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn ForumStore> {
        &self.store
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), AppError> {
        if self.is_halted() {
            return Err(AppError::Halted);
        }
        Ok(())
    }

    /// Latch the halted flag and build the error to hand back to the host.
    fn halt(&self, reason: String) -> AppError {
        error!("FATAL: {}; halting", reason);
        self.halted.store(true, Ordering::SeqCst);
        AppError::Fatal(reason)
    }

    /// Durable words first, then local ones, up to `MAX_EXTENSION_WORDS`.
    fn advertised_words(&self) -> ModerationWordSet {
        let durable = self.store.moderation_words().unwrap_or_else(|e| {
            warn!("Durable moderation words unavailable for extension: {}", e);
            ModerationWordSet::new()
        });
        let local = self.local_words.read();

        let mut words = ModerationWordSet::from_words(durable.iter().take(MAX_EXTENSION_WORDS));
        for word in local.iter() {
            if words.len() >= MAX_EXTENSION_WORDS {
                break;
            }
            words.insert(word);
        }

        let total = durable.union(&local).len();
        if words.len() < total {
            warn!("Advertising {} of {} moderation words", words.len(), total);
        }
        words
    }
}

/// Longest prefix of `txs` within `max_bytes`; 0 or less means no limit.
fn fit_to_budget(mut txs: Vec<Vec<u8>>, max_bytes: i64) -> Vec<Vec<u8>> {
    if max_bytes <= 0 {
        return txs;
    }
    let mut used = 0i64;
    let keep = txs
        .iter()
        .take_while(|tx| {
            used += tx.len() as i64;
            used <= max_bytes
        })
        .count();
    if keep < txs.len() {
        warn!("Proposal trimmed to {} of {} txs by byte budget", keep, txs.len());
        txs.truncate(keep);
    }
    txs
}

impl Application for ForumApp {
    fn info(&self, _req: RequestInfo) -> Result<ResponseInfo, AppError> {
        let height = self
            .store
            .committed_height()
            .map_err(|e| self.halt(format!("cannot read committed height: {}", e)))?;

        if self.registry.is_empty() && height > 0 {
            self.registry
                .reload(self.store.as_ref())
                .map_err(|e| self.halt(format!("cannot restore validators: {}", e)))?;
        }

        Ok(ResponseInfo {
            data: "agora forum ledger".to_string(),
            version: PROTOCOL_VERSION.to_string(),
            app_version: APP_VERSION,
            last_block_height: height,
        })
    }

    fn init_chain(&self, req: RequestInitChain) -> Result<ResponseInitChain, AppError> {
        self.ensure_running()?;

        let genesis: GenesisState = if req.app_state_bytes.is_empty() {
            GenesisState::default()
        } else {
            serde_json::from_slice(&req.app_state_bytes)
                .map_err(|e| self.halt(format!("invalid genesis app_state: {}", e)))?
        };

        let mut writes = WriteSet::new();
        self.registry
            .apply_updates(&req.validators, &mut writes)
            .map_err(|e| self.halt(format!("genesis validator set rejected: {}", e)))?;

        let words = ModerationWordSet::starter()
            .union(&ModerationWordSet::from_words(&genesis.moderation_words));
        info!(
            "InitChain {}: {} validators, moderation words {}",
            req.chain_id,
            self.registry.len(),
            words
        );
        writes.add_moderation_words(words);

        self.store
            .write(writes)
            .map_err(|e| self.halt(format!("cannot persist genesis state: {}", e)))?;

        Ok(ResponseInitChain {
            consensus_params: ConsensusParams {
                vote_extensions_enable_height: VOTE_EXTENSIONS_ENABLE_HEIGHT,
            },
            validators: Vec::new(),
        })
    }

    fn check_tx(&self, req: RequestCheckTx) -> Result<ResponseCheckTx, AppError> {
        self.ensure_running()?;
        Ok(match self.admission.check(&req.tx) {
            Ok(msg) => ResponseCheckTx {
                code: ResponseCode::Ok,
                log: format!("accepted post from {}", msg.sender),
            },
            Err(e) => {
                debug!("CheckTx rejected: {}", e);
                ResponseCheckTx {
                    code: e.tx_code(),
                    log: e.to_string(),
                }
            }
        })
    }

    fn prepare_proposal(
        &self,
        req: RequestPrepareProposal,
    ) -> Result<ResponsePrepareProposal, AppError> {
        self.ensure_running()?;

        let extensions: Vec<VoteExtension> = req
            .local_last_commit
            .votes
            .iter()
            .map(|v| VoteExtension::new(v.validator_address.clone(), v.vote_extension.clone()))
            .collect();
        let ratified = self.aggregator.ratify(&extensions);

        let txs = match self.builder.build(&req.txs, &ratified) {
            Ok(txs) => txs,
            Err(e) => {
                error!("Height {}: proposal build failed, proposing empty block: {}", req.height, e);
                Vec::new()
            }
        };
        Ok(ResponsePrepareProposal {
            txs: fit_to_budget(txs, req.max_tx_bytes),
        })
    }

    fn process_proposal(
        &self,
        req: RequestProcessProposal,
    ) -> Result<ResponseProcessProposal, AppError> {
        self.ensure_running()?;
        let status = match verify_proposal(&req.txs) {
            Ok(summary) => {
                debug!(
                    "Height {}: accepted proposal with {} bans, {} posts",
                    req.height, summary.bans, summary.posts
                );
                ProposalStatus::Accept
            }
            Err(e) => {
                info!("Height {}: rejected proposal: {}", req.height, e);
                ProposalStatus::Reject
            }
        };
        Ok(ResponseProcessProposal { status })
    }

    fn finalize_block(&self, req: RequestFinalizeBlock) -> Result<ResponseFinalizeBlock, AppError> {
        self.ensure_running()?;
        let outcomes = self.staging.lock().stage(req.height, &req.txs)?;
        Ok(ResponseFinalizeBlock {
            tx_results: outcomes
                .into_iter()
                .map(|o| ExecTxResult {
                    code: o.code,
                    log: o.log,
                })
                .collect(),
            validator_updates: Vec::new(),
            app_hash: Vec::new(),
        })
    }

    fn commit(&self) -> Result<ResponseCommit, AppError> {
        self.ensure_running()?;
        let batch = self.staging.lock().take().ok_or_else(|| {
            AppError::Consensus(ForumError::ConsensusInvariantViolated(
                "commit without a finalized block".to_string(),
            ))
        })?;

        match self.applier.apply(batch) {
            Ok(CommitOutcome::Applied { height, .. }) | Ok(CommitOutcome::Replayed { height }) => {
                debug!("Commit of height {} complete", height);
                Ok(ResponseCommit { retain_height: 0 })
            }
            Err(e) => Err(self.halt(e.to_string())),
        }
    }

    fn extend_vote(&self, req: RequestExtendVote) -> Result<ResponseExtendVote, AppError> {
        self.ensure_running()?;
        let words = self.advertised_words();
        debug!("Height {}: extending vote with {}", req.height, words);
        Ok(ResponseExtendVote {
            vote_extension: extension_payload(&words),
        })
    }

    fn verify_vote_extension(
        &self,
        req: RequestVerifyVoteExtension,
    ) -> Result<ResponseVerifyVoteExtension, AppError> {
        self.ensure_running()?;
        let status = match self
            .aggregator
            .verify(&req.validator_address, &req.vote_extension)
        {
            Ok(()) => VerifyStatus::Accept,
            Err(e) => {
                warn!("Height {}: rejecting vote extension: {}", req.height, e);
                VerifyStatus::Reject
            }
        };
        Ok(ResponseVerifyVoteExtension { status })
    }

    fn query(&self, req: RequestQuery) -> Result<ResponseQuery, AppError> {
        Ok(self.queries.handle(&req))
    }
}
