//! A `Wallet` is a wrapper around an ethers wallet holding the bundler's signing key

use ethers::{
    prelude::{k256::ecdsa::SigningKey, rand},
    signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer},
    types::Address,
};
use expanded_pathbuf::ExpandedPathBuf;
use std::fs;

/// Wrapper around ethers wallet
#[derive(Clone, Debug)]
pub struct Wallet {
    /// Signing key of the wallet
    pub signer: ethers::signers::Wallet<SigningKey>,
}

impl Wallet {
    /// Builds a `Wallet` from a randomly generated mnemonic phrase, written to `path`
    ///
    /// # Arguments
    /// * `path` - The path to the file where the mnemonic phrase will be written
    /// * `chain_id` - The chain id of the blockchain network to be used
    ///
    /// # Returns
    /// * `Self` - A new `Wallet` instance
    pub fn build_random(path: ExpandedPathBuf, chain_id: u64) -> eyre::Result<Self> {
        let mut rng = rand::thread_rng();

        fs::create_dir_all(&path)?;

        let wallet = MnemonicBuilder::<English>::default()
            .write_to(path.to_path_buf())
            .build_random(&mut rng)?;

        Ok(Self { signer: wallet.with_chain_id(chain_id) })
    }

    /// Creates a new wallet from the given file containing the mnemonic phrase
    ///
    /// # Arguments
    /// * `path` - The path to the file where the mnemonic phrase is stored
    /// * `chain_id` - The chain id of the blockchain network to be used
    ///
    /// # Returns
    /// * `Self` - A new `Wallet` instance
    pub fn from_file(path: ExpandedPathBuf, chain_id: u64) -> eyre::Result<Self> {
        let wallet = MnemonicBuilder::<English>::default().phrase(path.to_path_buf()).build()?;

        Ok(Self { signer: wallet.with_chain_id(chain_id) })
    }

    /// Creates a new wallet from the given private key
    ///
    /// # Arguments
    /// * `key` - Hex-encoded private key
    /// * `chain_id` - The chain id of the blockchain network to be used
    ///
    /// # Returns
    /// * `Self` - A new `Wallet` instance
    pub fn from_key(key: &str, chain_id: u64) -> eyre::Result<Self> {
        let wallet = key.parse::<LocalWallet>()?;

        Ok(Self { signer: wallet.with_chain_id(chain_id) })
    }

    /// Address of the bundler's signing key
    pub fn address(&self) -> Address {
        self.signer.address()
    }
}
