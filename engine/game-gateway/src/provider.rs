//! Buffalo provider adapter
//!
//! Translates provider callbacks into ledger operations. Every failure the
//! provider sees is collapsed to `{code: 0, msg}`; details go to the log.

use crate::audit::{BetAuditLog, NewBetRecord, STATUS_COMPLETED};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::messages::{
    AuthCredentials, BalanceRequest, ChangeBalanceRequest, GameAuthData, LaunchData,
    ProviderResponse, SpinAmounts,
};
use crate::rooms;
use crate::token;
use crate::uid::UidResolver;
use account_service::{Account, Balance, TransactionKind, WalletService};
use serde_json::json;
use std::sync::Arc;

/// Name recorded on every Buffalo audit record
pub const GAME_NAME: &str = "Buffalo Game";

/// Provider tag stored in ledger metadata
pub const PROVIDER: &str = "buffalo";

/// Provider-facing amount: whole units, never negative
fn provider_units(balance: Balance) -> i64 {
    balance.to_units_truncated().max(0)
}

/// Buffalo adapter over the wallet ledger
pub struct BuffaloService {
    wallet: WalletService,
    resolver: UidResolver,
    audit: Arc<dyn BetAuditLog>,
    config: Arc<GatewayConfig>,
}

impl BuffaloService {
    pub fn new(
        wallet: WalletService,
        audit: Arc<dyn BetAuditLog>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        let resolver =
            UidResolver::new(wallet.store().clone(), &config.site.prefix, &config.site.url);
        Self { wallet, resolver, audit, config }
    }

    pub fn wallet(&self) -> &WalletService {
        &self.wallet
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// UID and token for a login name
    pub fn credentials(&self, user_name: &str) -> AuthCredentials {
        AuthCredentials {
            uid: self.resolver.generate(user_name),
            token: token::generate_token(
                user_name,
                &self.config.site.url,
                &self.config.site.token_label,
            ),
            user_name: user_name.to_string(),
        }
    }

    /// Resolve the UID and check the token, returning the account it names
    pub async fn authenticate(&self, uid: &str, presented: &str) -> GatewayResult<Account> {
        let user_name = self
            .resolver
            .resolve(uid)
            .await?
            .ok_or_else(|| GatewayError::Authentication(format!("unresolvable uid {}", uid)))?;

        if !token::verify(&user_name, &self.config.site.url, &self.config.site.token_label, presented)
        {
            return Err(GatewayError::Authentication(format!("token mismatch for {}", user_name)));
        }

        match self.wallet.account_by_name(&user_name).await {
            Ok(account) => Ok(account),
            Err(account_service::AccountServiceError::UserNameNotFound { user_name }) => {
                Err(GatewayError::IdentityNotFound(user_name))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Provider balance query
    pub async fn balance_query(&self, request: &BalanceRequest) -> ProviderResponse {
        let result = async {
            request.validate()?;
            self.authenticate(&request.uid, &request.token).await
        }
        .await;

        match result {
            Ok(account) => {
                tracing::debug!("Balance query for {}: {}", account.user_name, account.balance);
                ProviderResponse::with_balance(provider_units(account.balance))
            }
            Err(e) => {
                tracing::warn!("Buffalo balance query rejected: {}", e);
                ProviderResponse::from(&e)
            }
        }
    }

    /// Provider balance change; `payload` is the raw request kept for the audit log
    pub async fn balance_change(
        &self,
        request: &ChangeBalanceRequest,
        payload: serde_json::Value,
    ) -> ProviderResponse {
        let result = async {
            request.validate()?;
            let amounts = request.amounts()?;
            let account = self.authenticate(&request.uid, &request.token).await?;
            let (before, after) = self.settle(&account, request, amounts).await?;
            Ok::<_, GatewayError>((account, amounts, before, after))
        }
        .await;

        let (account, amounts, before, after) = match result {
            Ok(settled) => settled,
            Err(e) => {
                tracing::warn!(
                    uid = %request.uid,
                    changemoney = request.changemoney,
                    "Buffalo balance change rejected: {}",
                    e
                );
                return ProviderResponse::from(&e);
            }
        };

        let record = NewBetRecord {
            member_account: account.user_name.clone(),
            player_id: account.id,
            parent_id: account.parent_id,
            provider_game_id: request.game_id,
            bet_amount: amounts.bet,
            win_amount: amounts.win,
            change_amount: amounts.change,
            before_balance: before,
            after_balance: after,
            payload,
            game_name: GAME_NAME.to_string(),
            status: STATUS_COMPLETED.to_string(),
            request_time: chrono::Utc::now().naive_utc(),
        };
        if let Err(e) = self.audit.record(record).await {
            tracing::error!(
                "Bet audit write failed for {} after committed change {} -> {}: {}",
                account.user_name,
                before,
                after,
                e
            );
        }

        ProviderResponse::success("Balance updated successfully")
    }

    /// Apply the signed change to the ledger, returning balances before and after
    async fn settle(
        &self,
        account: &Account,
        request: &ChangeBalanceRequest,
        amounts: SpinAmounts,
    ) -> GatewayResult<(Balance, Balance)> {
        let change = amounts.change;
        let kind = if change.is_positive() {
            TransactionKind::GameWin
        } else {
            TransactionKind::GameLoss
        };
        let meta = json!({
            "buffalo_game_id": request.game_id,
            "bet_amount": amounts.bet.to_units_truncated(),
            "win_amount": request.win,
            "provider": PROVIDER,
            "transaction_type": kind.as_str(),
        });

        let receipt = if change.is_positive() {
            self.wallet.deposit(account.id, change, kind, meta).await?
        } else if change.is_negative() {
            self.wallet.withdraw(account.id, change.abs(), kind, meta).await?
        } else {
            // Nothing to post; the spin is still audited
            return Ok((account.balance, account.balance));
        };

        Ok((receipt.balance_before, receipt.balance_after))
    }

    /// Credentials and room eligibility for an operator-initiated session
    pub async fn game_auth(&self, user_name: &str) -> GatewayResult<GameAuthData> {
        let account = self.find_player(user_name).await?;
        tracing::info!("Issued Buffalo credentials for {}", account.user_name);

        Ok(GameAuthData {
            auth: self.credentials(&account.user_name),
            available_rooms: rooms::available_for(account.balance),
            all_rooms: rooms::all().to_vec(),
            user_balance: provider_units(account.balance),
        })
    }

    /// Build the launch URL for a room the player's balance admits
    pub async fn launch(
        &self,
        user_name: &str,
        room_id: Option<u8>,
        lobby_url: Option<&str>,
    ) -> GatewayResult<LaunchData> {
        let account = self.find_player(user_name).await?;
        let room_id = room_id.unwrap_or(rooms::DEFAULT_ROOM);
        let room = rooms::get(room_id).ok_or(GatewayError::InvalidRoom(room_id))?;

        if !room.admits(account.balance) {
            tracing::info!(
                "{} refused room {}: balance {} below {}",
                account.user_name,
                room.id,
                account.balance,
                room.min_bet
            );
            return Err(GatewayError::RoomUnavailable { room_id: room.id, min_bet: room.min_bet });
        }

        let lobby_url = lobby_url
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.config.provider.default_lobby_url);
        let credentials = self.credentials(&account.user_name);
        let game_url = format!(
            "{}?gameId={}&roomId={}&lobbyUrl={}&uid={}&token={}",
            self.config.provider.launch_base_url,
            self.config.provider.game_id,
            room.id,
            urlencoding::encode(lobby_url),
            credentials.uid,
            credentials.token
        );
        tracing::info!("Launching Buffalo room {} for {}", room.id, account.user_name);

        Ok(LaunchData {
            url: game_url.clone(),
            game_url,
            room_info: *room,
            user_balance: provider_units(account.balance),
        })
    }

    async fn find_player(&self, user_name: &str) -> GatewayResult<Account> {
        match self.wallet.account_by_name(user_name).await {
            Ok(account) => Ok(account),
            Err(account_service::AccountServiceError::UserNameNotFound { user_name }) => {
                Err(GatewayError::IdentityNotFound(user_name))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{BetFilter, InMemoryAuditLog};
    use account_service::{
        AccountServiceConfig, DateRange, InMemoryLedger, LedgerStore, NewAccount, UserType,
    };

    struct Fixture {
        service: BuffaloService,
        audit: Arc<InMemoryAuditLog>,
        player: Account,
    }

    async fn fixture(opening_units: i64) -> Fixture {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let wallet = WalletService::new(store, &AccountServiceConfig::default());
        let owner = wallet.create_account(NewAccount::root("OWNER1", UserType::Owner)).await.unwrap();
        let agent = wallet
            .create_account(NewAccount::child_of(&owner, "AGENT01", UserType::Agent))
            .await
            .unwrap();
        let player = wallet
            .create_account(NewAccount::child_of(&agent, "PLAYER0101", UserType::Player))
            .await
            .unwrap();
        if opening_units > 0 {
            wallet
                .deposit(
                    player.id,
                    Balance::from_units(opening_units),
                    TransactionKind::Deposit,
                    json!({}),
                )
                .await
                .unwrap();
        }

        let audit = Arc::new(InMemoryAuditLog::new());
        let service =
            BuffaloService::new(wallet, audit.clone(), Arc::new(GatewayConfig::default()));
        Fixture { service, audit, player }
    }

    fn change(service: &BuffaloService, user_name: &str, changemoney: i64) -> ChangeBalanceRequest {
        let credentials = service.credentials(user_name);
        ChangeBalanceRequest {
            uid: credentials.uid,
            token: credentials.token,
            changemoney,
            bet: 500,
            win: (500 + changemoney).max(0),
            game_id: 23,
        }
    }

    #[tokio::test]
    async fn test_balance_query() {
        let f = fixture(1000).await;
        let credentials = f.service.credentials("PLAYER0101");
        let response = f
            .service
            .balance_query(&BalanceRequest { uid: credentials.uid, token: credentials.token })
            .await;
        assert_eq!(response, ProviderResponse::with_balance(1000));
    }

    #[tokio::test]
    async fn test_loss_then_win_scenario() {
        let f = fixture(1000).await;

        let request = change(&f.service, "PLAYER0101", -500);
        let payload = serde_json::to_value(&request).unwrap();
        let response = f.service.balance_change(&request, payload).await;
        assert_eq!(response, ProviderResponse::success("Balance updated successfully"));
        assert_eq!(f.service.wallet().balance(f.player.id).await.unwrap(), Balance::from_units(500));

        let records = f.audit.recent_for(&BetFilter::member("PLAYER0101"), 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record.before_balance, Balance::from_units(1000));
        assert_eq!(records[0].record.after_balance, Balance::from_units(500));
        assert_eq!(records[0].record.game_name, GAME_NAME);
        assert_eq!(records[0].record.parent_id, f.player.parent_id);

        let entry = &f.service.wallet().history(f.player.id, &DateRange::ALL, Some(1)).await.unwrap()[0];
        assert_eq!(entry.kind, TransactionKind::GameLoss);
        assert_eq!(entry.meta["provider"], "buffalo");
        assert_eq!(entry.meta["transaction_type"], "game_loss");

        let request = change(&f.service, "PLAYER0101", 4500);
        let response = f.service.balance_change(&request, json!({})).await;
        assert!(response.is_success());
        assert_eq!(
            f.service.wallet().balance(f.player.id).await.unwrap(),
            Balance::from_units(5000)
        );
        assert_eq!(f.audit.len(), 2);
    }

    #[tokio::test]
    async fn test_bad_token_changes_nothing() {
        let f = fixture(1000).await;
        let mut request = change(&f.service, "PLAYER0101", -500);
        request.token = "0".repeat(64);

        let response = f.service.balance_change(&request, json!({})).await;
        assert_eq!(response, ProviderResponse::failure("Invalid token"));
        assert_eq!(
            f.service.wallet().balance(f.player.id).await.unwrap(),
            Balance::from_units(1000)
        );
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_overdraw_is_rejected_without_audit() {
        let f = fixture(1000).await;
        let request = change(&f.service, "PLAYER0101", -1500);

        let response = f.service.balance_change(&request, json!({})).await;
        assert_eq!(response, ProviderResponse::failure("Transaction failed"));
        assert_eq!(
            f.service.wallet().balance(f.player.id).await.unwrap(),
            Balance::from_units(1000)
        );
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_range_change_is_invalid_request() {
        let f = fixture(0).await;
        let request = change(&f.service, "PLAYER0101", 100_000_000_000_000_000);

        let response = f.service.balance_change(&request, json!({})).await;
        assert_eq!(response, ProviderResponse::failure("Invalid request"));
        assert_eq!(f.service.wallet().balance(f.player.id).await.unwrap(), Balance::ZERO);
        assert!(f
            .service
            .wallet()
            .history(f.player.id, &DateRange::ALL, None)
            .await
            .unwrap()
            .is_empty());
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_zero_change_is_audited_without_ledger_entry() {
        let f = fixture(1000).await;
        let request = change(&f.service, "PLAYER0101", 0);

        let response = f.service.balance_change(&request, json!({})).await;
        assert!(response.is_success());
        assert_eq!(f.service.wallet().history(f.player.id, &DateRange::ALL, None).await.unwrap().len(), 1);
        let records = f.audit.recent_for(&BetFilter::member("PLAYER0101"), 10).await.unwrap();
        assert_eq!(records[0].record.before_balance, records[0].record.after_balance);
    }

    #[tokio::test]
    async fn test_unknown_uid_is_invalid_token() {
        let f = fixture(1000).await;
        let credentials = f.service.credentials("GHOST01");
        let response = f
            .service
            .balance_query(&BalanceRequest { uid: credentials.uid, token: credentials.token })
            .await;
        assert_eq!(response, ProviderResponse::failure("Invalid token"));
    }

    #[tokio::test]
    async fn test_fractional_balance_truncates_for_provider() {
        let f = fixture(0).await;
        f.service
            .wallet()
            .deposit(f.player.id, Balance::from_cents(12_99), TransactionKind::Deposit, json!({}))
            .await
            .unwrap();
        let credentials = f.service.credentials("PLAYER0101");
        let response = f
            .service
            .balance_query(&BalanceRequest { uid: credentials.uid, token: credentials.token })
            .await;
        assert_eq!(response.balance, Some(12));
    }

    #[tokio::test]
    async fn test_game_auth_lists_rooms() {
        let f = fixture(600).await;
        let data = f.service.game_auth("PLAYER0101").await.unwrap();
        assert_eq!(data.auth, f.service.credentials("PLAYER0101"));
        assert_eq!(data.available_rooms.len(), 2);
        assert_eq!(data.all_rooms.len(), 4);
        assert_eq!(data.user_balance, 600);

        assert!(matches!(
            f.service.game_auth("NOBODY").await,
            Err(GatewayError::IdentityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_launch_builds_url() {
        let f = fixture(600).await;
        let launch = f.service.launch("PLAYER0101", Some(2), Some("https://lobby.example/a b")).await.unwrap();
        let credentials = f.service.credentials("PLAYER0101");

        assert!(launch.game_url.starts_with("http://prime7.wlkfkskakdf.com/?gameId=23&roomId=2"));
        assert!(launch.game_url.contains("lobbyUrl=https%3A%2F%2Flobby.example%2Fa%20b"));
        assert!(launch.game_url.ends_with(&format!(
            "&uid={}&token={}",
            credentials.uid, credentials.token
        )));
        assert_eq!(launch.url, launch.game_url);
        assert_eq!(launch.room_info.id, 2);

        let default = f.service.launch("PLAYER0101", None, None).await.unwrap();
        assert!(default.game_url.contains("roomId=1"));
        assert!(default.game_url.contains("lobbyUrl=https%3A%2F%2Fafricanbuffalo.vip"));
    }

    #[tokio::test]
    async fn test_launch_refuses_rooms_above_balance() {
        let f = fixture(600).await;
        let err = f.service.launch("PLAYER0101", Some(3), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::RoomUnavailable { room_id: 3, min_bet: 5000 }));
        assert_eq!(err.public_message(), "Room not available for your balance level");

        let err = f.service.launch("PLAYER0101", Some(9), None).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRoom(9)));
    }
}
