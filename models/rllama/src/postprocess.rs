use rllm_plugin::PluginError;

/// Pick the response out of the raw generations: the first one.
pub fn postprocess(results: Vec<String>) -> Result<String, PluginError> {
    results
        .into_iter()
        .next()
        .ok_or(PluginError::EmptyGeneration)
}

#[test]
fn returns_the_first_result() {
    let response = postprocess(vec!["first".to_string(), "second".to_string()]).unwrap();
    assert_eq!(response, "first");
}

#[test]
fn empty_results_are_an_error() {
    assert!(matches!(
        postprocess(Vec::new()),
        Err(PluginError::EmptyGeneration)
    ));
}
