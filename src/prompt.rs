//! Prompt assembly for SQL generation.
//!
//! A prompt is a fixed template with `{schema}` and `{question}`
//! placeholders. The schema text comes from live introspection and the
//! question is the built-in receiving-report question below.

/// Stop sequence passed to the model so generation halts before it starts
/// inventing a `SQLResult:` continuation.
pub const STOP_SEQUENCE: &str = "\nSQLResult:";

/// Tables the schema introspection is restricted to.
pub const REPORT_TABLES: [&str; 7] = [
    "tabPurchase Order",
    "tabPurchase Order Item",
    "tabPurchase Receipt",
    "tabPurchase Receipt Item",
    "tabPurchase Invoice",
    "tabPurchase Invoice Item",
    "tabBatch",
];

/// The fixed business question submitted on every run.
pub const BUSINESS_QUESTION: &str = "
Business Question:
    - What are the received purchased items on a certain period? Are there over/under received purchased items?
    - What are the unreceived ordered items?

Description: An item-level report that shows received purchase orders and purchase orders expected to be received.

Filters and Parameters:
    - Company: Reference only transactions and branches of the selected company
    - Purchase Receipt Start Date
        - If received, based on the Purchase Receipt date. If still unreceived, based on the Required By Date defined in the Purchase Order.
        - Include only purchase orders / purchase receipts during or after this date
    - Purchase Receipt End Date
        - If received, based on the Purchase Receipt date. If still unreceived, based on the Required By Date defined in the Purchase Order.
        - Include only purchase orders / purchase receipts before or during this date
    - Warehouse: Include transactions in the selected warehouse
    - Supplier: Include only items sold by the selected supplier
    - Brand (multi-select)
        - Include only items of the Brand/s selected
    - Item: Include only item selected
    - Purchase Order #: Show only items in the specified PO #
    - Supplier's Sales Invoice: Show only items in the specified Sales Invoice (defined in the Purchase Receipt)
    - Purchase Receipt #: Show only items in the specified PR #
    - Status (radio button):
        - All - include both unreceived PO items and received items through the Purchase Receipt (Default Value)
            - Unreceived items from Purchase Orders with Closed status should be excluded
        - Received - include only ordered items that are received already through the Purchase Receipt
        - Unreceived - include only ordered items that are still waiting to be received
            - Unreceived items from Purchase Orders with Closed status should be excluded
    - Over/Under Received Only (checkbox):
        - If checked, include only received items where the quantity received does not match the quantity ordered.
        - Defaults to unchecked

Fields:
    - Purchase Order #: Show the Purchase Order No. (name)
    - Purchase Order Date: Show the Purchase Order Date
    - Expected Delivery Date: Show the Required By Date in the Purchase Order
    - Supplier: Show the Supplier in the Purchase Order
    - Supplier's Sales Invoice: Show the Supplier Invoice No. in the Purchase Invoice (if any)
    - Purchase Receipt #: Show the Purchase Receipt No. (name)
    - Purchase Receipt Date: Show the Purchase Receipt Date
    - Receiving Warehouse: Show the warehouse in the Purchase Receipt. If not yet received, show the warehouse in the Purchase Order.
    - Barcode: Show the barcode in the Purchase Receipt. If not yet received, show the barcode in the Purchase Order.
    - Item Code: Item Name: Show the Item Code: Item Name in the Purchase Order
    - Batch: Batch No in the Purchase Receipt
    - Expiration Date: Show the Expiration Date of the received Batch
    - Purchase Order UOM: UOM in the Purchase Order
    - Expected Qty: Ordered Quantity in the Purchase Order
    - Purchase Receipt UOM: UOM in the Purchase Receipt
    - Received Qty: Received Quantity in the Purchase Receipt
    - Over/Under Received Qty:
        - If the item is partially or fully received, Received Qty - Expected Qty
        - If the item is still unreceived, it should be empty
    - Receiver: Show user who created the Purchase Receipt

Notes:
    - Prioritize joins between item/child tables
";

const SQL_GENERATION_TEMPLATE: &str = "Based on the table schema below, write a SQL query that would answer the user's question. Filter values are supplied at run time as named parameters; reference each filter by the parameter name given in the question:
{schema}

Question: {question}
SQL Query:";

/// A text template with named placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Create a template from arbitrary text. Placeholders are `{schema}`
    /// and `{question}`; anything else is passed through untouched.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The built-in SQL-generation template.
    pub fn sql_generation() -> Self {
        Self::new(SQL_GENERATION_TEMPLATE)
    }

    /// Fill both placeholders. Values are embedded verbatim; every
    /// occurrence of a placeholder is replaced.
    pub fn render(&self, schema: &str, question: &str) -> String {
        self.template
            .replace("{schema}", schema)
            .replace("{question}", question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_render_embeds_schema_and_question_verbatim() {
        let template = PromptTemplate::sql_generation();
        let schema = "CREATE TABLE `tabBatch` (\n  `name` varchar(140)\n)";
        let question = "Which batches expire this month?";
        let rendered = template.render(schema, question);

        assert!(rendered.contains(schema));
        assert!(rendered.contains(question));
        assert!(!rendered.contains("{schema}"));
        assert!(!rendered.contains("{question}"));
    }

    #[test]
    fn test_render_replaces_every_occurrence() {
        let template = PromptTemplate::new("{question} -- {question}");
        assert_eq!(template.render("", "q"), "q -- q");
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let template = PromptTemplate::new("{schema} {filters}");
        assert_eq!(template.render("s", "q"), "s {filters}");
    }

    #[test]
    fn test_builtin_template_ends_with_sql_cue() {
        let rendered = PromptTemplate::sql_generation().render("S", "Q");
        assert!(rendered.ends_with("SQL Query:"));
        assert!(rendered.contains("Question: Q"));
    }

    #[test]
    fn test_report_tables_cover_purchasing_documents() {
        assert_eq!(REPORT_TABLES.len(), 7);
        assert!(REPORT_TABLES.contains(&"tabPurchase Receipt Item"));
        assert!(REPORT_TABLES.contains(&"tabBatch"));
    }

    #[test]
    fn test_question_names_filters_and_fields() {
        assert!(BUSINESS_QUESTION.contains("Filters and Parameters:"));
        assert!(BUSINESS_QUESTION.contains("Fields:"));
        assert!(BUSINESS_QUESTION.contains("Over/Under Received Qty"));
    }
}
