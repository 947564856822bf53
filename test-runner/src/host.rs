//! In-memory host capabilities

use std::collections::BTreeMap;

use nova_syscalls::{Bank, Coin, Querier};

/// Gas a [`MemoryBank`] reports for each transfer
pub const TRANSFER_GAS: u64 = 1_000;

/// A bank paying out of a single reserve
#[derive(Debug, Default, Clone)]
pub struct MemoryBank {
    reserve: BTreeMap<String, u64>,
    balances: BTreeMap<(String, String), u64>,
}

impl MemoryBank {
    /// Creates a bank with an empty reserve
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coin` to the reserve
    pub fn fund(&mut self, coin: Coin) {
        let entry = self.reserve.entry(coin.denom).or_default();
        *entry = entry.saturating_add(coin.amount);
    }

    /// Reserve left for `denom`
    pub fn reserve(&self, denom: &str) -> u64 {
        self.reserve.get(denom).copied().unwrap_or_default()
    }

    /// Balance of `account` in `denom`
    pub fn balance(&self, account: &str, denom: &str) -> u64 {
        self.balances
            .get(&(account.to_string(), denom.to_string()))
            .copied()
            .unwrap_or_default()
    }
}

impl Bank for MemoryBank {
    fn transfer(&mut self, recipient: &str, coin: &Coin) -> (anyhow::Result<()>, u64) {
        let available = self.reserve(&coin.denom);
        let Some(left) = available.checked_sub(coin.amount) else {
            return (
                Err(anyhow::anyhow!(
                    "insufficient {}: have {available}, need {}",
                    coin.denom,
                    coin.amount
                )),
                TRANSFER_GAS,
            );
        };
        self.reserve.insert(coin.denom.clone(), left);
        let balance = self
            .balances
            .entry((recipient.to_string(), coin.denom.clone()))
            .or_default();
        *balance = balance.saturating_add(coin.amount);
        (Ok(()), TRANSFER_GAS)
    }
}

/// A querier answering from a fixed table
#[derive(Debug, Default, Clone)]
pub struct StaticQuerier {
    answers: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl StaticQuerier {
    /// Creates an empty querier
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `request` with `answer`
    pub fn with_answer(mut self, request: &[u8], answer: &[u8]) -> Self {
        self.answers.insert(request.to_vec(), answer.to_vec());
        self
    }
}

impl Querier for StaticQuerier {
    fn query(&self, request: &[u8]) -> anyhow::Result<Vec<u8>> {
        self.answers
            .get(request)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown query: {}", String::from_utf8_lossy(request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_transfer_moves_reserve() {
        let mut bank = MemoryBank::new();
        bank.fund(Coin::new("unova", 100));

        let (result, gas) = bank.transfer("bob", &Coin::new("unova", 30));
        assert!(result.is_ok());
        assert_eq!(gas, TRANSFER_GAS);
        assert_eq!(bank.reserve("unova"), 70);
        assert_eq!(bank.balance("bob", "unova"), 30);

        let (result, gas) = bank.transfer("bob", &Coin::new("unova", 71));
        assert_eq!(result.unwrap_err().to_string(), "insufficient unova: have 70, need 71");
        assert_eq!(gas, TRANSFER_GAS);
    }

    #[test]
    fn test_static_querier() {
        let querier = StaticQuerier::new().with_answer(b"price", b"42");
        assert_eq!(querier.query(b"price").unwrap(), b"42".to_vec());
        assert!(querier.query(b"volume").is_err());
    }
}
