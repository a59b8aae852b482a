use ethers::contract::abigen;

abigen!(
    EntryPointAPI,
    r#"[
        struct UserOperation {address sender;uint256 nonce;bytes initCode;bytes callData;uint256 callGasLimit;uint256 verificationGasLimit;uint256 preVerificationGas;uint256 maxFeePerGas;uint256 maxPriorityFeePerGas;bytes paymasterAndData;bytes signature;}
        struct ReturnInfo {uint256 preOpGas;uint256 prefund;bool sigFailed;uint48 validAfter;uint48 validUntil;bytes paymasterContext;}
        struct StakeInfo {uint256 stake;uint256 unstakeDelaySec;}
        struct AggregatorStakeInfo {address aggregator;StakeInfo stakeInfo;}
        struct DepositInfo {uint112 deposit;bool staked;uint112 stake;uint32 unstakeDelaySec;uint48 withdrawTime;}
        function handleOps(UserOperation[] calldata ops,address payable beneficiary) external
        function simulateValidation(UserOperation calldata userOp) external
        function balanceOf(address account) external view returns (uint256)
        function getDepositInfo(address account) external view returns (DepositInfo memory info)
        function depositTo(address account) external payable
        function getSenderAddress(bytes memory initCode) external
        function getUserOpHash(UserOperation calldata userOp) external view returns (bytes32)
        error ValidationResult(ReturnInfo returnInfo,StakeInfo senderInfo,StakeInfo factoryInfo,StakeInfo paymasterInfo)
        error ValidationResultWithAggregation(ReturnInfo returnInfo,StakeInfo senderInfo,StakeInfo factoryInfo,StakeInfo paymasterInfo,AggregatorStakeInfo aggregatorInfo)
        error FailedOp(uint256 opIndex,string reason)
        error SenderAddressResult(address sender)
        error SignatureValidationFailed(address aggregator)
        event UserOperationEvent(bytes32 indexed userOpHash,address indexed sender,address indexed paymaster,uint256 nonce,bool success,uint256 actualGasCost,uint256 actualGasUsed)
        event AccountDeployed(bytes32 indexed userOpHash,address indexed sender,address factory,address paymaster)
        event SignatureAggregatorChanged(address indexed aggregator)
        event UserOperationRevertReason(bytes32 indexed userOpHash,address indexed sender,uint256 nonce,bytes revertReason)
        event Deposited(address indexed account,uint256 totalDeposit)
    ]"#
);

impl From<operon_primitives::UserOperation> for entry_point_api::UserOperation {
    fn from(uo: operon_primitives::UserOperation) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: uo.call_gas_limit,
            verification_gas_limit: uo.verification_gas_limit,
            pre_verification_gas: uo.pre_verification_gas,
            max_fee_per_gas: uo.max_fee_per_gas,
            max_priority_fee_per_gas: uo.max_priority_fee_per_gas,
            paymaster_and_data: uo.paymaster_and_data,
            signature: uo.signature,
        }
    }
}
