use gameflowcore::{
    Config, Dispatch, FinishReason, FlowAsset, FlowNode, GraphError, NodeContext, PinLayout,
    Value,
};
use gameflowruntime::{FlowInstance, NodeFactory, NodeMetadata};
use std::sync::Arc;

pub const SUBGRAPH_NODE_TYPE: &str = "core.subgraph";

/// Runs another flow asset as a nested instance.
///
/// Inputs mirror the nested asset's entry points and outputs mirror its
/// exit points; binding regenerates both. The nested instance is created
/// on first use and shares the owning instance's services, so its latent
/// nodes are ticked by the same world.
pub struct SubgraphNode {
    asset_name: String,
    template: Option<Arc<FlowAsset>>,
    inner: Option<FlowInstance>,
}

impl SubgraphNode {
    pub fn new(asset_name: impl Into<String>) -> Self {
        Self {
            asset_name: asset_name.into(),
            template: None,
            inner: None,
        }
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn inner(&self) -> Option<&FlowInstance> {
        self.inner.as_ref()
    }

    /// Leave through the exit the nested run finished on, if it finished.
    fn resolve_inner(&mut self, ctx: &mut NodeContext<'_>) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        if !inner.is_finished() {
            return;
        }
        match inner.take_finish_reason() {
            Some(FinishReason::Exit { name }) => ctx.finish_execute(name, true),
            Some(FinishReason::Failed { message }) => {
                ctx.fail(format!("subgraph '{}' failed: {}", self.asset_name, message))
            }
            Some(_) => ctx.finish(true),
            // Already resolved.
            None => {}
        }
    }
}

impl std::fmt::Debug for SubgraphNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubgraphNode")
            .field("asset_name", &self.asset_name)
            .field("bound", &self.template.is_some())
            .field("inner", &self.inner.as_ref().map(FlowInstance::id))
            .finish()
    }
}

impl FlowNode for SubgraphNode {
    fn node_type(&self) -> &str {
        SUBGRAPH_NODE_TYPE
    }

    fn default_pins(&self) -> PinLayout {
        PinLayout::default()
    }

    fn execute(&mut self, pin: &str, ctx: &mut NodeContext<'_>) {
        let Some(template) = self.template.clone() else {
            tracing::error!(
                "Subgraph node {} has no asset bound (wants '{}')",
                ctx.node_id(),
                self.asset_name
            );
            ctx.error(format!("no asset bound for '{}'", self.asset_name));
            ctx.finish(true);
            return;
        };

        let services = ctx.services().clone();
        let inner = self
            .inner
            .get_or_insert_with(|| FlowInstance::new(template, services));
        if let Err(e) = inner.execute(pin) {
            tracing::warn!("Subgraph node {} could not enter '{}': {}", ctx.node_id(), pin, e);
            ctx.finish(true);
            return;
        }
        self.resolve_inner(ctx);
    }

    fn forward_event(&mut self, dispatch: &Dispatch, ctx: &mut NodeContext<'_>) -> bool {
        let Some(inner) = self.inner.as_mut() else {
            return false;
        };
        if !inner.dispatch_event(dispatch) {
            return false;
        }
        self.resolve_inner(ctx);
        true
    }

    fn on_finish_execute(&mut self, _ctx: &mut NodeContext<'_>) {
        if let Some(inner) = self.inner.as_mut() {
            if inner.is_running() {
                inner.cancel();
            }
            inner.take_finish_reason();
        }
    }

    fn config(&self) -> Config {
        Config::from([("asset".to_string(), Value::from(self.asset_name.as_str()))])
    }

    fn clone_node(&self) -> Box<dyn FlowNode> {
        Box::new(SubgraphNode {
            asset_name: self.asset_name.clone(),
            template: self.template.clone(),
            inner: None,
        })
    }

    fn is_subgraph(&self) -> bool {
        true
    }

    fn asset_reference(&self) -> Option<&str> {
        (!self.asset_name.is_empty()).then_some(self.asset_name.as_str())
    }

    fn nested_asset(&self) -> Option<&Arc<FlowAsset>> {
        self.template.as_ref()
    }

    fn bind_nested_asset(&mut self, template: Arc<FlowAsset>) {
        if self.asset_name.is_empty() {
            self.asset_name = template.name().to_string();
        }
        self.template = Some(template);
        self.inner = None;
    }

    fn debug_info(&self) -> Option<String> {
        match &self.inner {
            Some(inner) if inner.is_running() => Some(format!(
                "'{}': {} active",
                self.asset_name,
                inner.active_count()
            )),
            _ => Some(format!("'{}'", self.asset_name)),
        }
    }
}

pub struct SubgraphNodeFactory;

impl NodeFactory for SubgraphNodeFactory {
    fn create(&self, config: &Config) -> Result<Box<dyn FlowNode>, GraphError> {
        let asset = config.get("asset").and_then(Value::as_str).unwrap_or_default();
        Ok(Box::new(SubgraphNode::new(asset)))
    }

    fn node_type(&self) -> &str {
        SUBGRAPH_NODE_TYPE
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Runs another flow asset; pins follow its entry and exit points"
                .to_string(),
            ..Default::default()
        }
    }
}
