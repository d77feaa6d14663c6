//! Prompt text for the QCM generation agents.

use super::state::Difficulty;

fn question_difficulty_rules(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "- Les questions doivent tester la compréhension basique et le rappel
- Se concentrer sur les définitions, faits simples et concepts directs
- Éviter le raisonnement complexe ou la réflexion en plusieurs étapes
- Les questions doivent être directement répondables à partir du texte"
        }
        Difficulty::Medium => {
            "- Les questions doivent tester la compréhension et l'application
- Inclure des questions nécessitant de l'inférence ou des connexions entre concepts
- Mélange de questions factuelles et analytiques
- Certaines questions peuvent nécessiter de comprendre le contexte"
        }
        Difficulty::Hard => {
            "- Les questions doivent tester l'analyse, la synthèse et l'évaluation
- Inclure des questions nécessitant une compréhension approfondie
- Poser des questions sur les relations, implications et cas limites
- Les questions peuvent nécessiter de combiner plusieurs informations"
        }
    }
}

fn wrong_choice_rules(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "RÈGLES POUR LES MAUVAIS CHOIX (FACILE):
- Les mauvais choix doivent être CLAIREMENT incorrects
- Ils doivent être faciles à éliminer pour quelqu'un avec des connaissances basiques
- Utiliser des concepts sans rapport ou des erreurs factuelles évidentes
- Un étudiant avec une compréhension minimale doit facilement identifier la bonne réponse"
        }
        Difficulty::Medium => {
            "RÈGLES POUR LES MAUVAIS CHOIX (MOYEN):
- Un mauvais choix (wrong_choice_1) doit être PLAUSIBLE - pourrait tromper quelqu'un
- Un mauvais choix (wrong_choice_2) doit être clairement incorrect
- Le choix plausible doit être lié au sujet mais subtilement incorrect"
        }
        Difficulty::Hard => {
            "RÈGLES POUR LES MAUVAIS CHOIX (DIFFICILE):
- LES DEUX mauvais choix doivent être TRÈS PLAUSIBLES
- Ils nécessitent une compréhension approfondie pour les distinguer de la bonne réponse
- Utiliser des idées reçues subtiles, des cas limites ou des demi-vérités
- Même les étudiants bien informés doivent réfléchir attentivement"
        }
    }
}

pub fn question_generator_system_prompt(topic: &str, count: usize, difficulty: Difficulty) -> String {
    format!(
        "Tu es un expert en conception d'évaluations éducatives créant des Questions à Choix Multiples (QCM).\n\n\
         Ta tâche est de générer exactement {count} questions sur \"{topic}\" basées sur la base de connaissances fournie.\n\n\
         NIVEAU DE DIFFICULTÉ: {}\n{}\n\n\
         RÈGLES:\n\
         1. Génère EXACTEMENT {count} questions - ni plus, ni moins\n\
         2. Les questions doivent être répondables à partir de la base de connaissances fournie\n\
         3. Les questions doivent être claires, non ambiguës et bien formulées\n\
         4. Chaque question doit tester un aspect ou concept différent\n\
         5. NE PAS inclure les réponses ou les choix - juste les questions\n\
         6. Les questions doivent être EN FRANÇAIS\n\
         7. Éviter les questions oui/non - poser des questions \"quoi\", \"quel\", \"comment\", \"pourquoi\"\n\n\
         FORMAT DE SORTIE:\n\
         Retourne une question par ligne, chaque ligne numérotée:\n\
         1. Première question ici?\n\
         2. Deuxième question ici?\n\
         Rien d'autre que les {count} lignes numérotées.",
        difficulty.as_str().to_uppercase(),
        question_difficulty_rules(difficulty),
    )
}

pub fn question_generator_user_prompt(
    topic: &str,
    count: usize,
    difficulty: Difficulty,
    knowledge_context: &str,
) -> String {
    format!(
        "À partir de cette base de connaissances sur \"{topic}\", génère exactement {count} questions de niveau {}:\n\n\
         <base_de_connaissances>\n{knowledge_context}\n</base_de_connaissances>\n\n\
         Génère {count} questions EN FRANÇAIS, une par ligne, numérotées. Rien d'autre.",
        difficulty.as_str(),
    )
}

pub fn answer_generator_system_prompt(topic: &str, difficulty: Difficulty) -> String {
    format!(
        "Tu es un expert en création de QCM (Questions à Choix Multiples) pour des évaluations éducatives.\n\n\
         Ta tâche est de créer les choix de réponse pour une question sur \"{topic}\".\n\n\
         {}\n\n\
         RÈGLES DE CRÉATION DES RÉPONSES:\n\
         1. La bonne réponse (right_choice) DOIT être directement supportée par la base de connaissances\n\
         2. Garder tous les choix de longueur et style similaires\n\
         3. Éviter \"toutes les réponses ci-dessus\" ou \"aucune des réponses\"\n\
         4. Chaque choix doit être une réponse complète et autonome\n\
         5. Indiquer dans source_id le numéro de la source qui supporte le mieux ta bonne réponse\n\
         6. TOUT DOIT ÊTRE EN FRANÇAIS\n\n\
         FORMAT DE SORTIE (JSON):\n\
         {{\n\
             \"right_choice\": \"La bonne réponse basée sur les connaissances\",\n\
             \"wrong_choice_1\": \"Premier choix incorrect\",\n\
             \"wrong_choice_2\": \"Deuxième choix incorrect\",\n\
             \"source_id\": 1\n\
         }}",
        wrong_choice_rules(difficulty),
    )
}

pub fn answer_generator_user_prompt(
    question: &str,
    difficulty: Difficulty,
    knowledge_context: &str,
) -> String {
    format!(
        "Crée les choix QCM pour cette question:\n\n\
         QUESTION: {question}\n\n\
         BASE DE CONNAISSANCES:\n{knowledge_context}\n\n\
         À partir de ces connaissances, crée:\n\
         1. La bonne réponse (doit être supportée par les connaissances)\n\
         2. Deux mauvais choix suivant les règles de difficulté {}\n\
         3. Le numéro source_id de la source qui supporte ta réponse\n\n\
         TOUT EN FRANÇAIS. Retourne UNIQUEMENT l'objet JSON.",
        difficulty.as_str().to_uppercase(),
    )
}
