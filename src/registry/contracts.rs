//! Generated ABI bindings for the watched registry contracts.
//!
//! Only the event surface the listener dispatches on is declared here; decoding goes
//! through the `SolEvent` impls the `sol!` macro derives.

use alloy::sol;

sol! {
    /// Agent lifecycle events.
    #[derive(Debug)]
    contract AgentRegistry {
        event AgentUpdated(uint256 indexed agentId, address indexed by, string metadata, uint256[] chainIds);
        event AgentEnabled(uint256 indexed agentId, bool enabled);
    }

    /// Scanner lifecycle events.
    #[derive(Debug)]
    contract ScannerRegistry {
        event ScannerUpdated(uint256 indexed scannerId, uint256 indexed chainId, string metadata);
        event ScannerEnabled(uint256 indexed scannerId, bool enabled);
    }

    /// Agent-to-scanner assignment events.
    #[derive(Debug)]
    contract Dispatch {
        event Link(uint256 agentId, uint256 scannerId, bool enable);
    }
}
