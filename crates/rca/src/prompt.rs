//! Prompt assembly for the RCA call.

use model::{CodeBlock, ExceptionCluster};

/// Fixed system message carrying the JSON schema the analyzer parses.
pub const SYSTEM_PROMPT: &str = r#"You are an expert SRE and senior software engineer.
Analyze production exceptions to identify the root cause, involved parameters, and propose fixes.
Return your analysis as valid JSON matching this schema:

{
  "likely_root_cause": {
    "file_path": "path/to/file.py",
    "symbol": "function_name",
    "line_range": [start, end],
    "confidence": 0.0-1.0,
    "explanation": "detailed explanation"
  },
  "supporting_evidence": [
    {
      "file_path": "...",
      "code_snippet": "...",
      "relevance": "..."
    }
  ],
  "involved_parameters": [
    {
      "name": "parameter_name",
      "value": "value",
      "issue": "why this is problematic"
    }
  ],
  "fix_suggestions": [
    "specific fix suggestion"
  ],
  "tests_to_add": [
    "test case description"
  ]
}"#;

/// How many stack frames the prompt lists.
const PROMPT_FRAMES: usize = 10;
/// How many retrieved blocks are inlined with full code.
const PROMPT_BLOCKS: usize = 2;

/// Assemble the user prompt from the cluster snapshot and retrieved code.
pub fn build_user_prompt(cluster: &ExceptionCluster, blocks: &[CodeBlock]) -> String {
    let mut parts = vec![
        format!("Service: {}", cluster.service_id),
        format!("Exception Type: {}", cluster.exception_type),
        format!("Exception Message: {}", cluster.exception_message),
        format!("Frequency: {} occurrences in 24h", cluster.frequency_24h),
        String::new(),
    ];

    if !cluster.stack_trace.is_empty() {
        parts.push("Stack Trace:".to_string());
        for (index, frame) in cluster.stack_trace.iter().take(PROMPT_FRAMES).enumerate() {
            parts.push(format!(
                "{}. {}:{} in {}",
                index + 1,
                frame.file,
                frame.line,
                frame.symbol
            ));
        }
        parts.push(String::new());
    }

    if !blocks.is_empty() {
        parts.push("Relevant Code Blocks:".to_string());
        for (index, block) in blocks.iter().take(PROMPT_BLOCKS).enumerate() {
            parts.push(format!("\n--- Block {} ({}) ---", index + 1, block.symbol_name));
            parts.push(format!("File: {}", block.file_path));
            parts.push(format!("Lines: {}-{}", block.line_start, block.line_end));
            parts.push("Code:".to_string());
            parts.push("```".to_string());
            parts.push(block.code_snippet.clone());
            parts.push("```".to_string());
            parts.push(String::new());
        }
    }

    parts.push("\nAnalyze this exception and provide your findings in JSON format.".to_string());
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::{ClusterStatus, FrameType, StackFrame, SymbolType};

    fn cluster() -> ExceptionCluster {
        ExceptionCluster {
            cluster_id: "cluster_1".into(),
            service_id: "svc_1".into(),
            log_source_id: "src_1".into(),
            exception_type: "NullPointerException".into(),
            exception_message: "cart was null".into(),
            fingerprint_static: "abcd".into(),
            fingerprint_semantic: None,
            fingerprint_category: None,
            error_category: None,
            key_terms: vec![],
            representative_log_id: None,
            stack_trace: vec![StackFrame {
                symbol: "com.acme.Cart.total".into(),
                file: "Cart.java".into(),
                line: 42,
                frame_type: FrameType::Java,
            }],
            logger_path: "com.acme.Cart".into(),
            cluster_size: 12,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            frequency_24h: 12,
            frequency_7d: 12,
            status: ClusterStatus::Active,
            status_updated_at: None,
            status_updated_by: None,
            has_rca: false,
            rca_generated_at: None,
        }
    }

    fn block(symbol: &str) -> CodeBlock {
        CodeBlock {
            block_id: "b1".into(),
            service_id: "svc_1".into(),
            repository: "checkout".into(),
            version: "main".into(),
            commit_sha: "abc".into(),
            file_path: "src/Cart.java".into(),
            symbol_name: symbol.into(),
            symbol_type: SymbolType::Method,
            line_start: 40,
            line_end: 55,
            code_snippet: "public BigDecimal total() { ... }".into(),
            docstring: String::new(),
            function_signature: "BigDecimal total()".into(),
            embedding_id: "b1".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_contains_cluster_identity() {
        let prompt = build_user_prompt(&cluster(), &[block("com.acme.Cart.total")]);
        assert!(prompt.contains("Exception Type: NullPointerException"));
        assert!(prompt.contains("Cart.java:42 in com.acme.Cart.total"));
        assert!(prompt.contains("12 occurrences in 24h"));
        assert!(prompt.contains("--- Block 1 (com.acme.Cart.total) ---"));
        assert!(prompt.contains("public BigDecimal total()"));
    }

    #[test]
    fn test_prompt_limits_blocks() {
        let blocks: Vec<CodeBlock> = (0..5).map(|i| block(&format!("sym{i}"))).collect();
        let prompt = build_user_prompt(&cluster(), &blocks);
        assert!(prompt.contains("Block 1"));
        assert!(prompt.contains("Block 2"));
        assert!(!prompt.contains("Block 3"));
    }

    #[test]
    fn test_system_prompt_carries_schema() {
        assert!(SYSTEM_PROMPT.contains("likely_root_cause"));
        assert!(SYSTEM_PROMPT.contains("fix_suggestions"));
        assert!(SYSTEM_PROMPT.contains("tests_to_add"));
    }
}
